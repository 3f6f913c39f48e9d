//! Everything needed to speak the launchpad program's wire format without
//! touching the network: addresses, discriminators, argument bytes,
//! instruction assembly, and account decoding.

pub mod accounts;
pub mod codec;
pub mod discriminator;
pub mod instruction;
pub mod pda;
