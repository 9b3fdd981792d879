//! Per-chunk cipher instances
//!
//! Every chunk gets a fresh cipher built from the shared key and the chunk's
//! own IV. Ciphers consume input incrementally through [`ChunkCipher::update`]
//! and flush padding or the authentication tag in [`ChunkCipher::finish`].
//!
//! - CTR, OFB, CFB and ChaCha20 are length-preserving and transform in place.
//! - ECB and CBC apply PKCS#7 on the final chunk only.
//! - GCM buffers the payload and appends a 16-byte tag after the ciphertext.

use cipher::consts::{U12, U16};
use cipher::generic_array::GenericArray;
use cipher::{
    BlockCipher, BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, BlockSizeUser,
    KeyInit, KeyIvInit, StreamCipher,
};
use aes_gcm::aead::AeadInPlace;
use parcrypt_core::Direction;
use tracing::trace;

use crate::catalog::{AlgorithmSpec, BlockMode, CipherFamily};
use crate::error::CipherError;
use crate::keys::SecretKey;
use crate::mode::iv_len;
use crate::{GCM_TAG_LEN, STREAM_NONCE_LEN};

/// A cipher bound to one chunk of the payload.
pub trait ChunkCipher: Send {
    /// Transform `input`, appending whatever output is ready to `out`.
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CipherError>;

    /// Flush buffered state: padding, held-back blocks, the GCM tag.
    fn finish(self: Box<Self>, out: &mut Vec<u8>) -> Result<(), CipherError>;
}

/// Everything needed to build one chunk's cipher
#[derive(Debug, Clone, Copy)]
pub struct CipherParams<'a> {
    pub algorithm: &'static AlgorithmSpec,
    pub mode: BlockMode,
    pub key: &'a [u8],
    /// Chunk IV, GCM nonce, or stream nonce. `None` for ECB.
    pub iv: Option<&'a [u8]>,
    pub direction: Direction,
    /// Whether this chunk ends the payload (padding and tag live there)
    pub is_final: bool,
}

/// Builds per-chunk ciphers. The engine only sees this seam.
pub trait CipherFactory: Send + Sync {
    fn create(&self, iv: Option<&[u8]>, is_final: bool)
        -> Result<Box<dyn ChunkCipher>, CipherError>;
}

/// Factory holding the derived key for one operation
#[derive(Debug)]
pub struct KeyedCipherFactory {
    algorithm: &'static AlgorithmSpec,
    mode: BlockMode,
    direction: Direction,
    key: SecretKey,
    stream_nonce: Option<Vec<u8>>,
}

impl KeyedCipherFactory {
    pub fn new(
        algorithm: &'static AlgorithmSpec,
        mode: BlockMode,
        direction: Direction,
        key: SecretKey,
        stream_nonce: Option<Vec<u8>>,
    ) -> Self {
        Self {
            algorithm,
            mode,
            direction,
            key,
            stream_nonce,
        }
    }

    pub fn algorithm(&self) -> &'static AlgorithmSpec {
        self.algorithm
    }

    pub fn mode(&self) -> BlockMode {
        self.mode
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl CipherFactory for KeyedCipherFactory {
    fn create(
        &self,
        iv: Option<&[u8]>,
        is_final: bool,
    ) -> Result<Box<dyn ChunkCipher>, CipherError> {
        let iv = if self.algorithm.family.is_stream() {
            self.stream_nonce.as_deref()
        } else {
            iv
        };
        create_cipher(&CipherParams {
            algorithm: self.algorithm,
            mode: self.mode,
            key: self.key.as_bytes(),
            iv,
            direction: self.direction,
            is_final,
        })
    }
}

/// Build a cipher for one chunk.
pub fn create_cipher(params: &CipherParams<'_>) -> Result<Box<dyn ChunkCipher>, CipherError> {
    let spec = params.algorithm;
    if !spec.supports(params.mode) {
        return Err(CipherError::Unsupported(format!(
            "{} does not support mode {}",
            spec.id, params.mode
        )));
    }
    if params.key.len() != spec.key_len() {
        return Err(CipherError::InvalidKeyLength {
            expected: spec.key_len(),
            actual: params.key.len(),
        });
    }

    let expected_iv = if spec.family.is_stream() {
        STREAM_NONCE_LEN
    } else {
        iv_len(spec, params.mode)
    };
    let iv = match (expected_iv, params.iv) {
        (0, _) => &[][..],
        (n, Some(iv)) if iv.len() == n => iv,
        (n, other) => {
            return Err(CipherError::InvalidIvLength {
                expected: n,
                actual: other.map_or(0, <[u8]>::len),
            })
        }
    };

    trace!(
        algorithm = spec.id,
        mode = %params.mode,
        direction = %params.direction,
        is_final = params.is_final,
        "creating chunk cipher"
    );

    match (spec.family, spec.key_size_bits) {
        (CipherFamily::ChaCha20, _) => {
            let cipher = chacha20::ChaCha20::new_from_slices(params.key, iv)
                .map_err(|_| key_len_error(params))?;
            Ok(keystream(cipher))
        }
        (CipherFamily::Aes, 128) => build_block::<aes::Aes128>(params, iv),
        (CipherFamily::Aes, 192) => build_block::<aes::Aes192>(params, iv),
        (CipherFamily::Aes, 256) => build_block::<aes::Aes256>(params, iv),
        (CipherFamily::Twofish, _) => build_block::<twofish::Twofish>(params, iv),
        (family, bits) => Err(CipherError::Unsupported(format!(
            "no implementation for {family} with a {bits}-bit key"
        ))),
    }
}

fn key_len_error(params: &CipherParams<'_>) -> CipherError {
    CipherError::InvalidKeyLength {
        expected: params.algorithm.key_len(),
        actual: params.key.len(),
    }
}

fn build_block<C>(params: &CipherParams<'_>, iv: &[u8]) -> Result<Box<dyn ChunkCipher>, CipherError>
where
    C: BlockCipher
        + BlockEncrypt
        + BlockDecrypt
        + BlockSizeUser<BlockSize = U16>
        + KeyInit
        + Send
        + 'static,
{
    let key = params.key;
    let bad_key = |_: cipher::InvalidLength| key_len_error(params);
    let encrypt = params.direction.is_encrypt();

    let cipher: Box<dyn ChunkCipher> = match params.mode {
        BlockMode::Ctr => keystream(ctr::Ctr128BE::<C>::new_from_slices(key, iv).map_err(bad_key)?),
        BlockMode::Ofb => keystream(ofb::Ofb::<C>::new_from_slices(key, iv).map_err(bad_key)?),
        BlockMode::Cfb if encrypt => {
            let mut enc = cfb_mode::BufEncryptor::<C>::new_from_slices(key, iv).map_err(bad_key)?;
            in_place(move |buf| {
                enc.encrypt(buf);
                Ok(())
            })
        }
        BlockMode::Cfb => {
            let mut dec = cfb_mode::BufDecryptor::<C>::new_from_slices(key, iv).map_err(bad_key)?;
            in_place(move |buf| {
                dec.decrypt(buf);
                Ok(())
            })
        }
        BlockMode::Ecb if encrypt => {
            let block = C::new_from_slice(key).map_err(bad_key)?;
            Box::new(PaddedEncryptor::new(block, params.is_final))
        }
        BlockMode::Ecb => {
            let block = C::new_from_slice(key).map_err(bad_key)?;
            Box::new(PaddedDecryptor::new(block, params.is_final))
        }
        BlockMode::Cbc if encrypt => {
            let enc = cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(bad_key)?;
            Box::new(PaddedEncryptor::new(enc, params.is_final))
        }
        BlockMode::Cbc => {
            let dec = cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(bad_key)?;
            Box::new(PaddedDecryptor::new(dec, params.is_final))
        }
        BlockMode::Gcm => {
            let aead: aes_gcm::AesGcm<C, U12> = KeyInit::new_from_slice(key).map_err(bad_key)?;
            Box::new(GcmCipher {
                aead,
                nonce: iv.to_vec(),
                encrypt,
                buf: Vec::new(),
            })
        }
        BlockMode::None => {
            return Err(CipherError::Unsupported(
                "block cipher requires a block mode".into(),
            ))
        }
    };
    Ok(cipher)
}

fn keystream<S: StreamCipher + Send + 'static>(mut cipher: S) -> Box<dyn ChunkCipher> {
    in_place(move |buf| {
        cipher
            .try_apply_keystream(buf)
            .map_err(|_| CipherError::KeystreamExhausted)
    })
}

fn in_place<F>(f: F) -> Box<dyn ChunkCipher>
where
    F: FnMut(&mut [u8]) -> Result<(), CipherError> + Send + 'static,
{
    Box::new(InPlace(f))
}

/// Length-preserving transform applied directly to the output buffer
struct InPlace<F>(F);

impl<F> ChunkCipher for InPlace<F>
where
    F: FnMut(&mut [u8]) -> Result<(), CipherError> + Send,
{
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CipherError> {
        let start = out.len();
        out.extend_from_slice(input);
        (self.0)(&mut out[start..])
    }

    fn finish(self: Box<Self>, _out: &mut Vec<u8>) -> Result<(), CipherError> {
        Ok(())
    }
}

/// ECB/CBC encryption with PKCS#7 on the final chunk
struct PaddedEncryptor<M> {
    mode: M,
    pending: Vec<u8>,
    is_final: bool,
}

impl<M: BlockEncryptMut> PaddedEncryptor<M> {
    fn new(mode: M, is_final: bool) -> Self {
        Self {
            mode,
            pending: Vec::with_capacity(M::block_size()),
            is_final,
        }
    }

    fn emit(&mut self, ready: usize, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend(self.pending.drain(..ready));
        for block in out[start..].chunks_exact_mut(M::block_size()) {
            self.mode.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
    }
}

impl<M: BlockEncryptMut + Send> ChunkCipher for PaddedEncryptor<M> {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CipherError> {
        let bs = M::block_size();
        self.pending.extend_from_slice(input);
        let ready = self.pending.len() / bs * bs;
        self.emit(ready, out);
        Ok(())
    }

    fn finish(mut self: Box<Self>, out: &mut Vec<u8>) -> Result<(), CipherError> {
        let bs = M::block_size();
        if !self.is_final {
            return if self.pending.is_empty() {
                Ok(())
            } else {
                Err(CipherError::UnalignedInput {
                    len: self.pending.len(),
                    block_size: bs,
                })
            };
        }
        let pad = bs - self.pending.len();
        self.pending.resize(bs, pad as u8);
        self.emit(bs, out);
        Ok(())
    }
}

/// ECB/CBC decryption; the final chunk holds back its last block to unpad it
struct PaddedDecryptor<M> {
    mode: M,
    pending: Vec<u8>,
    is_final: bool,
}

impl<M: BlockDecryptMut> PaddedDecryptor<M> {
    fn new(mode: M, is_final: bool) -> Self {
        Self {
            mode,
            pending: Vec::with_capacity(M::block_size()),
            is_final,
        }
    }

    fn emit(&mut self, ready: usize, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend(self.pending.drain(..ready));
        for block in out[start..].chunks_exact_mut(M::block_size()) {
            self.mode.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
    }
}

impl<M: BlockDecryptMut + Send> ChunkCipher for PaddedDecryptor<M> {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CipherError> {
        let bs = M::block_size();
        self.pending.extend_from_slice(input);
        let ready = if self.is_final {
            self.pending.len().saturating_sub(1) / bs * bs
        } else {
            self.pending.len() / bs * bs
        };
        self.emit(ready, out);
        Ok(())
    }

    fn finish(mut self: Box<Self>, out: &mut Vec<u8>) -> Result<(), CipherError> {
        let bs = M::block_size();
        if !self.is_final {
            return if self.pending.is_empty() {
                Ok(())
            } else {
                Err(CipherError::UnalignedInput {
                    len: self.pending.len(),
                    block_size: bs,
                })
            };
        }
        if self.pending.len() != bs {
            return Err(CipherError::UnalignedInput {
                len: self.pending.len(),
                block_size: bs,
            });
        }
        let start = out.len();
        self.emit(bs, out);
        let pad = out[out.len() - 1] as usize;
        if pad == 0 || pad > bs || !out[start + bs - pad..].iter().all(|&b| b as usize == pad) {
            out.truncate(start);
            return Err(CipherError::BadPadding);
        }
        out.truncate(out.len() - pad);
        Ok(())
    }
}

/// GCM over the whole payload: ciphertext followed by the tag
struct GcmCipher<A> {
    aead: A,
    nonce: Vec<u8>,
    encrypt: bool,
    buf: Vec<u8>,
}

impl<A: AeadInPlace + Send> ChunkCipher for GcmCipher<A> {
    fn update(&mut self, input: &[u8], _out: &mut Vec<u8>) -> Result<(), CipherError> {
        self.buf.extend_from_slice(input);
        Ok(())
    }

    fn finish(self: Box<Self>, out: &mut Vec<u8>) -> Result<(), CipherError> {
        let GcmCipher {
            aead,
            nonce,
            encrypt,
            mut buf,
        } = *self;
        let nonce = GenericArray::from_slice(&nonce);
        if encrypt {
            let tag = aead
                .encrypt_in_place_detached(nonce, b"", &mut buf)
                .map_err(|_| CipherError::AeadEncrypt)?;
            buf.extend_from_slice(&tag);
        } else {
            if buf.len() < GCM_TAG_LEN {
                return Err(CipherError::MissingTag(buf.len()));
            }
            let split = buf.len() - GCM_TAG_LEN;
            let tag = GenericArray::clone_from_slice(&buf[split..]);
            aead.decrypt_in_place_detached(nonce, b"", &mut buf[..split], &tag)
                .map_err(|_| CipherError::AuthenticationFailed)?;
            buf.truncate(split);
        }
        hand_over(buf, out);
        Ok(())
    }
}

/// Move `buf` into `out` without copying when `out` holds nothing yet.
fn hand_over(mut buf: Vec<u8>, out: &mut Vec<u8>) {
    if out.is_empty() {
        std::mem::swap(out, &mut buf);
    } else {
        out.append(&mut buf);
    }
}
