//! XChaCha20-Poly1305 secret stream
//!
//! 与 libsodium `crypto_secretstream_xchacha20poly1305` 字节级兼容，
//! 消息 App 的附件即由它加密。
//!
//! 结构：
//! - header（24 字节）：前 16 字节经 HChaCha20 派生子密钥，后 8 字节为初始 inonce
//! - 每个 chunk：`加密后的 tag (1) || 密文 (mlen) || Poly1305 MAC (16)`
//!
//! 每个 chunk 使用 ChaCha20-IETF：
//! - block 0 的 keystream 前 32 字节作为 Poly1305 一次性密钥
//! - block 1 加密 tag 字节（整块 64 字节参与 MAC）
//! - block 2 起加密消息本身
//!
//! 注意：
//! - 本模块不使用附加数据（AD 恒为空）
//! - MAC 校验通过之前不会输出任何明文

use chacha20::cipher::consts::U10;
use chacha20::cipher::generic_array::GenericArray;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{ChaCha20, hchacha};
use poly1305::Poly1305;
use poly1305::universal_hash::KeyInit;
use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::key::{AttachmentKey, KEY_LEN};
use crate::error::StreamError;

/// header 长度
pub const HEADER_BYTES: usize = 24;

/// 每个 chunk 相对明文的额外开销：tag 1 字节 + MAC 16 字节
pub const ABYTES: usize = 1 + MAC_BYTES;

const MAC_BYTES: usize = 16;
const BLOCK_BYTES: usize = 64;
const COUNTER_BYTES: usize = 4;
const INONCE_BYTES: usize = 8;
const HCHACHA_INPUT_BYTES: usize = 16;

/// chunk tag
///
/// 保留原始字节：认证通过的 chunk 可能携带任意 tag 值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(pub u8);

impl Tag {
    pub const MESSAGE: Tag = Tag(0x00);
    pub const PUSH: Tag = Tag(0x01);
    pub const REKEY: Tag = Tag(0x02);
    pub const FINAL: Tag = Tag(Self::PUSH.0 | Self::REKEY.0);

    pub fn is_final(self) -> bool {
        self == Self::FINAL
    }

    fn requests_rekey(self) -> bool {
        self.0 & Self::REKEY.0 != 0
    }
}

/// 双方共享的流状态：子密钥 + `counter (LE u32) || inonce`
#[derive(Zeroize, ZeroizeOnDrop)]
struct State {
    key: [u8; KEY_LEN],
    nonce: [u8; COUNTER_BYTES + INONCE_BYTES],
}

impl State {
    fn new(key: &AttachmentKey, header: &[u8; HEADER_BYTES]) -> Self {
        let subkey = hchacha::<U10>(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&header[..HCHACHA_INPUT_BYTES]),
        );

        let mut state = Self {
            key: [0u8; KEY_LEN],
            nonce: [0u8; COUNTER_BYTES + INONCE_BYTES],
        };
        state.key.copy_from_slice(&subkey);
        state.nonce[COUNTER_BYTES..].copy_from_slice(&header[HCHACHA_INPUT_BYTES..]);
        state.reset_counter();
        state
    }

    /// 定位到指定 block 的 ChaCha20-IETF keystream
    fn keystream_at(&self, block: u64) -> ChaCha20 {
        let mut cipher = ChaCha20::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&self.nonce),
        );
        cipher.seek(block * BLOCK_BYTES as u64);
        cipher
    }

    fn mac(&self, tag_block: &[u8; BLOCK_BYTES], ciphertext: &[u8]) -> [u8; MAC_BYTES] {
        let mut one_time_key = Zeroizing::new([0u8; BLOCK_BYTES]);
        self.keystream_at(0).apply_keystream(&mut one_time_key[..]);

        // AD 为空，其长度与填充都为 0。
        // 密文后的填充长度为 `mlen & 0xf`，与 libsodium 的实现保持一致。
        let mut input = Vec::with_capacity(BLOCK_BYTES + ciphertext.len() + 2 * MAC_BYTES);
        input.extend_from_slice(tag_block);
        input.extend_from_slice(ciphertext);
        input.resize(input.len() + (ciphertext.len() & 0xf), 0);
        input.extend_from_slice(&0u64.to_le_bytes());
        input.extend_from_slice(&((BLOCK_BYTES + ciphertext.len()) as u64).to_le_bytes());

        let poly = Poly1305::new(poly1305::Key::from_slice(&one_time_key[..KEY_LEN]));
        let mut mac = [0u8; MAC_BYTES];
        mac.copy_from_slice(&poly.compute_unpadded(&input));
        mac
    }

    /// 每个 chunk 之后推进状态：inonce ^= mac，counter += 1，必要时 rekey
    fn advance(&mut self, tag: Tag, mac: &[u8; MAC_BYTES]) {
        for (n, m) in self.nonce[COUNTER_BYTES..].iter_mut().zip(mac) {
            *n ^= m;
        }

        let mut counter = [0u8; COUNTER_BYTES];
        counter.copy_from_slice(&self.nonce[..COUNTER_BYTES]);
        let counter = u32::from_le_bytes(counter).wrapping_add(1);
        self.nonce[..COUNTER_BYTES].copy_from_slice(&counter.to_le_bytes());

        if tag.requests_rekey() || counter == 0 {
            self.rekey();
        }
    }

    fn rekey(&mut self) {
        let mut material = Zeroizing::new([0u8; KEY_LEN + INONCE_BYTES]);
        material[..KEY_LEN].copy_from_slice(&self.key);
        material[KEY_LEN..].copy_from_slice(&self.nonce[COUNTER_BYTES..]);

        self.keystream_at(0).apply_keystream(&mut material[..]);

        self.key.copy_from_slice(&material[..KEY_LEN]);
        self.nonce[COUNTER_BYTES..].copy_from_slice(&material[KEY_LEN..]);
        self.reset_counter();
    }

    fn reset_counter(&mut self) {
        self.nonce[..COUNTER_BYTES].copy_from_slice(&1u32.to_le_bytes());
    }
}

/// 加密方向（push）
pub struct SecretStreamPush {
    state: State,
}

impl SecretStreamPush {
    /// 使用随机 header 初始化，header 需写在密文最前面
    pub fn init(key: &AttachmentKey) -> (Self, [u8; HEADER_BYTES]) {
        let mut header = [0u8; HEADER_BYTES];
        OsRng.fill_bytes(&mut header);
        (Self::with_header(key, &header), header)
    }

    pub fn with_header(key: &AttachmentKey, header: &[u8; HEADER_BYTES]) -> Self {
        Self {
            state: State::new(key, header),
        }
    }

    /// 加密一个 chunk，返回 `tag || 密文 || mac`
    pub fn push(&mut self, message: &[u8], tag: Tag) -> Vec<u8> {
        let mut tag_block = Zeroizing::new([0u8; BLOCK_BYTES]);
        tag_block[0] = tag.0;
        self.state.keystream_at(1).apply_keystream(&mut tag_block[..]);

        let mut ciphertext = message.to_vec();
        self.state.keystream_at(2).apply_keystream(&mut ciphertext);

        let mac = self.state.mac(&tag_block, &ciphertext);

        let mut chunk = Vec::with_capacity(ABYTES + ciphertext.len());
        chunk.push(tag_block[0]);
        chunk.extend_from_slice(&ciphertext);
        chunk.extend_from_slice(&mac);

        self.state.advance(tag, &mac);
        chunk
    }
}

/// 解密方向（pull）
pub struct SecretStreamPull {
    state: State,
}

impl SecretStreamPull {
    pub fn init(key: &AttachmentKey, header: &[u8; HEADER_BYTES]) -> Self {
        Self {
            state: State::new(key, header),
        }
    }

    /// 校验并解密一个 chunk，返回明文与其 tag
    ///
    /// tag 的含义（是否为最后一个 chunk）由调用方判断。
    pub fn pull(&mut self, chunk: &[u8]) -> Result<(Vec<u8>, Tag), StreamError> {
        if chunk.len() < ABYTES {
            return Err(StreamError::TruncatedChunk(chunk.len()));
        }

        let message_len = chunk.len() - ABYTES;
        let encrypted_tag = chunk[0];
        let ciphertext = &chunk[1..1 + message_len];
        let stored_mac = &chunk[1 + message_len..];

        // ---------- 解出 tag，并还原参与 MAC 的 block ----------
        let mut tag_block = Zeroizing::new([0u8; BLOCK_BYTES]);
        tag_block[0] = encrypted_tag;
        self.state.keystream_at(1).apply_keystream(&mut tag_block[..]);
        let tag = Tag(tag_block[0]);
        tag_block[0] = encrypted_tag;

        // ---------- 先认证，后解密 ----------
        let mac = self.state.mac(&tag_block, ciphertext);
        if !bool::from(mac.as_slice().ct_eq(stored_mac)) {
            return Err(StreamError::Authentication);
        }

        let mut message = ciphertext.to_vec();
        self.state.keystream_at(2).apply_keystream(&mut message);

        self.state.advance(tag, &mac);
        Ok((message, tag))
    }
}
