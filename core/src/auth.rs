//! CBC-MAC packet authentication over a pluggable AES-128 backend.
//!
//! Both backends compute the same function: the message is processed in
//! 16-byte blocks, each XORed into a running state that is then encrypted in
//! place, and the final state is the tag. Bytes past the end of a short final
//! block contribute zero to the XOR. The backends must produce bit-identical
//! tags for the same key and message.

use aes::cipher::{BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::Aes128;

use crate::error::{PipelineError, Result};

pub const CIPHER_BLOCK_LENGTH: usize = 16;

/// 128-bit symmetric key, loaded once at initialization.
pub type CipherKey = [u8; 16];

/// Which cipher engine computes the tag. A static configuration choice;
/// there is no runtime fallback from one backend to the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherBackend {
    /// Reference implementation: the block cipher is driven block by block
    /// in the calling context.
    Software,
    /// Whole-message CBC encryption delegated to the platform cipher engine
    /// (AES-NI / ARMv8-CE where available); the last output block is the tag.
    Hardware,
}

enum Backend {
    Software {
        cipher: Aes128,
    },
    Hardware {
        /// Holds the zero-padded message for the CBC engine. Sized once at
        /// construction so the send path never allocates.
        scratch: Vec<u8>,
        max_padded: usize,
    },
}

pub struct Authenticator {
    key: CipherKey,
    backend: Backend,
}

impl Authenticator {
    /// `max_message_len` bounds the messages the hardware backend will
    /// accept; the software backend has no such bound.
    pub fn new(backend: CipherBackend, key: CipherKey, max_message_len: usize) -> Result<Self> {
        let backend = match backend {
            CipherBackend::Software => Backend::Software {
                cipher: Aes128::new_from_slice(&key)
                    .map_err(|e| PipelineError::CryptoBackend(e.to_string()))?,
            },
            CipherBackend::Hardware => {
                let max_padded = padded_len(max_message_len);
                Backend::Hardware {
                    scratch: Vec::with_capacity(max_padded),
                    max_padded,
                }
            }
        };
        Ok(Self { key, backend })
    }

    /// 16-byte CBC-MAC of `message` under the configured key.
    pub fn tag(&mut self, message: &[u8]) -> Result<[u8; CIPHER_BLOCK_LENGTH]> {
        if message.is_empty() {
            return Err(PipelineError::CryptoBackend(
                "refusing to tag an empty message".into(),
            ));
        }
        match &mut self.backend {
            Backend::Software { cipher } => {
                let mut state = [0u8; CIPHER_BLOCK_LENGTH];
                for block in message.chunks(CIPHER_BLOCK_LENGTH) {
                    for (s, &b) in state.iter_mut().zip(block) {
                        *s ^= b;
                    }
                    cipher.encrypt_block(aes::Block::from_mut_slice(&mut state));
                }
                Ok(state)
            }
            Backend::Hardware { scratch, max_padded } => {
                let padded = padded_len(message.len());
                if padded > *max_padded {
                    return Err(PipelineError::CryptoBackend(format!(
                        "message of {} bytes exceeds the {}-byte scratch buffer",
                        message.len(),
                        max_padded
                    )));
                }
                scratch.clear();
                scratch.extend_from_slice(message);
                scratch.resize(padded, 0);

                let mut engine = cbc::Encryptor::<Aes128>::new_from_slices(
                    &self.key,
                    &[0u8; CIPHER_BLOCK_LENGTH],
                )
                .map_err(|e| PipelineError::CryptoBackend(e.to_string()))?;
                for block in scratch.chunks_exact_mut(CIPHER_BLOCK_LENGTH) {
                    engine.encrypt_block_mut(aes::Block::from_mut_slice(block));
                }

                let mut tag = [0u8; CIPHER_BLOCK_LENGTH];
                tag.copy_from_slice(&scratch[padded - CIPHER_BLOCK_LENGTH..]);
                Ok(tag)
            }
        }
    }
}

fn padded_len(message_len: usize) -> usize {
    (message_len + CIPHER_BLOCK_LENGTH - 1) / CIPHER_BLOCK_LENGTH * CIPHER_BLOCK_LENGTH
}
