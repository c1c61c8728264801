//! Watermarking networks: message-embedding encoder, message decoder,
//! their noised composition, and the cover-vs-encoded discriminator.

pub mod blocks;
pub mod decoder;
pub mod discriminator;
pub mod encoder;
pub mod encoder_decoder;
