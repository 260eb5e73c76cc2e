/// AES-CBC framing used for every device exchange
///
/// A frame is `IV (16 bytes) || ciphertext`. The ciphertext decrypts to
/// `payload || zero padding || CRC-32(payload || padding)`, with the checksum
/// stored big-endian in the last four bytes of the final block.
///
/// Padding is plain zero bytes, so a payload that itself ends in zero bytes
/// loses them on decryption. Devices rely on this exact layout.
use openssl::error::ErrorStack;
use openssl::rand::rand_bytes;
use openssl::symm::{Cipher, Crypter, Mode};
use thiserror::Error;

pub const BLOCK_SIZE: usize = 16;
pub const TAG_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid key length {0}, expected 16, 24 or 32 bytes")]
    InvalidKeyLength(usize),

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("checksum mismatch: expected {expected:08x}, received {received:08x}")]
    IntegrityFailure { expected: u32, received: u32 },

    #[error("padded buffer of {0} bytes is not block aligned")]
    Unaligned(usize),

    #[error("cipher error: {0}")]
    Cipher(#[from] ErrorStack),
}

fn cipher_for_key(key: &[u8]) -> Result<Cipher, FrameError> {
    match key.len() {
        16 => Ok(Cipher::aes_128_cbc()),
        24 => Ok(Cipher::aes_192_cbc()),
        32 => Ok(Cipher::aes_256_cbc()),
        n => Err(FrameError::InvalidKeyLength(n)),
    }
}

/// Run the raw CBC transform over block-aligned input, no padding
fn cbc(cipher: Cipher, mode: Mode, key: &[u8], iv: &[u8], input: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut crypter = Crypter::new(cipher, mode, key, Some(iv))?;
    crypter.pad(false);

    let mut output = vec![0u8; input.len() + cipher.block_size()];
    let mut count = crypter.update(input, &mut output)?;
    count += crypter.finalize(&mut output[count..])?;
    output.truncate(count);
    Ok(output)
}

/// Number of zero bytes appended before the tag
///
/// Always between 1 and BLOCK_SIZE: a payload that would already be aligned
/// still gets a whole block of zeros, as the device firmware expects.
fn padding_len(payload_len: usize) -> usize {
    BLOCK_SIZE - (payload_len + TAG_SIZE) % BLOCK_SIZE
}

/// Encrypt a payload into a frame under the device key with a fresh random IV
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, FrameError> {
    let cipher = cipher_for_key(key)?;

    let mut buffer = Vec::with_capacity(plaintext.len() + BLOCK_SIZE + TAG_SIZE);
    buffer.extend_from_slice(plaintext);
    buffer.resize(plaintext.len() + padding_len(plaintext.len()), 0);

    let crc = crc32fast::hash(&buffer);
    buffer.extend_from_slice(&crc.to_be_bytes());

    if buffer.len() % BLOCK_SIZE != 0 {
        return Err(FrameError::Unaligned(buffer.len()));
    }

    let mut iv = [0u8; BLOCK_SIZE];
    rand_bytes(&mut iv)?;

    let ciphertext = cbc(cipher, Mode::Encrypt, key, &iv, &buffer)?;

    let mut frame = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    frame.extend_from_slice(&iv);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Decrypt a frame, verify its checksum and strip the zero padding
pub fn decrypt(key: &[u8], frame: &[u8]) -> Result<Vec<u8>, FrameError> {
    let cipher = cipher_for_key(key)?;

    if frame.len() < BLOCK_SIZE {
        return Err(FrameError::MalformedFrame("shorter than one block, no IV"));
    }
    let (iv, ciphertext) = frame.split_at(BLOCK_SIZE);

    if ciphertext.is_empty() {
        return Err(FrameError::MalformedFrame("no ciphertext after IV"));
    }
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(FrameError::MalformedFrame("ciphertext is not block aligned"));
    }

    let mut plaintext = cbc(cipher, Mode::Decrypt, key, iv, ciphertext)?;

    let tag_start = plaintext.len() - TAG_SIZE;
    let received = u32::from_be_bytes([
        plaintext[tag_start],
        plaintext[tag_start + 1],
        plaintext[tag_start + 2],
        plaintext[tag_start + 3],
    ]);
    plaintext.truncate(tag_start);

    let expected = crc32fast::hash(&plaintext);
    if expected != received {
        return Err(FrameError::IntegrityFailure { expected, received });
    }

    let end = plaintext.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    plaintext.truncate(end);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "00112233445566778899aabbccddeeff";
    const TEST_FRAME: &str = concat!(
        "6cc6527f1d3d56c79d6b130beb76fe90cf170663be65a0952fc3ec7c280a8512",
        "c989288a55d64514663c85725aff0224633301b7c48bc9d1d14b8b77c77c9920"
    );

    #[test]
    fn decrypts_known_device_frame() {
        let key = hex::decode(TEST_KEY).unwrap();
        let frame = hex::decode(TEST_FRAME).unwrap();

        let plaintext = decrypt(&key, &frame).unwrap();
        assert_eq!(plaintext, b"just some random boring test data");
    }

    #[test]
    fn round_trips_multi_block_payload() {
        let key = b"0123456789abcdef0123456789abcdef";
        let data = b"another chunk of boring test data for encryption, long enough to fill multiple blocks";

        let frame = encrypt(key, data).unwrap();
        assert_eq!(decrypt(key, &frame).unwrap(), data.to_vec());
    }

    #[test]
    fn round_trips_with_every_key_size() {
        for len in [16, 24, 32] {
            let key: Vec<u8> = (0..len as u8).collect();
            let frame = encrypt(&key, b"current_time=1600000000").unwrap();
            assert_eq!(decrypt(&key, &frame).unwrap(), b"current_time=1600000000");
        }
    }

    #[test]
    fn trailing_zero_bytes_are_lost() {
        let key = hex::decode(TEST_KEY).unwrap();
        let frame = encrypt(&key, b"payload\0\0\0").unwrap();

        // Zero padding cannot be told apart from zeros in the payload
        assert_eq!(decrypt(&key, &frame).unwrap(), b"payload");
    }

    #[test]
    fn empty_payload_round_trips() {
        let key = hex::decode(TEST_KEY).unwrap();
        let frame = encrypt(&key, b"").unwrap();
        assert_eq!(frame.len(), 2 * BLOCK_SIZE);
        assert!(decrypt(&key, &frame).unwrap().is_empty());
    }

    #[test]
    fn frame_length_is_iv_plus_whole_blocks() {
        let key = hex::decode(TEST_KEY).unwrap();
        for len in 0..64 {
            let payload = vec![b'x'; len];
            let frame = encrypt(&key, &payload).unwrap();
            assert_eq!(frame.len() % BLOCK_SIZE, 0);
            let body = frame.len() - BLOCK_SIZE;
            assert_eq!(body, len + padding_len(len) + TAG_SIZE);
            assert!(padding_len(len) >= 1 && padding_len(len) <= BLOCK_SIZE);
        }
    }

    #[test]
    fn aligned_payload_gets_a_full_block_of_padding() {
        assert_eq!(padding_len(12), BLOCK_SIZE);
        assert_eq!(padding_len(33), 11);
    }

    #[test]
    fn fresh_iv_per_frame() {
        let key = hex::decode(TEST_KEY).unwrap();
        let a = encrypt(&key, b"same payload").unwrap();
        let b = encrypt(&key, b"same payload").unwrap();
        assert_ne!(a[..BLOCK_SIZE], b[..BLOCK_SIZE]);
    }

    #[test]
    fn any_flipped_bit_fails_integrity() {
        let key = hex::decode(TEST_KEY).unwrap();
        let frame = hex::decode(TEST_FRAME).unwrap();

        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut tampered = frame.clone();
                tampered[byte] ^= 1 << bit;
                match decrypt(&key, &tampered) {
                    Err(FrameError::IntegrityFailure { .. }) => {}
                    other => panic!("byte {} bit {}: unexpected {:?}", byte, bit, other),
                }
            }
        }
    }

    #[test]
    fn wrong_key_fails_integrity() {
        let frame = hex::decode(TEST_FRAME).unwrap();
        let wrong = hex::decode("ffeeddccbbaa99887766554433221100").unwrap();
        assert!(matches!(
            decrypt(&wrong, &frame),
            Err(FrameError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn rejects_short_and_unaligned_frames() {
        let key = hex::decode(TEST_KEY).unwrap();
        assert!(matches!(
            decrypt(&key, &[0u8; 10]),
            Err(FrameError::MalformedFrame(_))
        ));
        assert!(matches!(
            decrypt(&key, &[0u8; BLOCK_SIZE]),
            Err(FrameError::MalformedFrame(_))
        ));
        assert!(matches!(
            decrypt(&key, &[0u8; BLOCK_SIZE + 20]),
            Err(FrameError::MalformedFrame(_))
        ));
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(matches!(
            encrypt(&[0u8; 15], b"data"),
            Err(FrameError::InvalidKeyLength(15))
        ));
        assert!(matches!(
            decrypt(&[0u8; 20], &[0u8; 32]),
            Err(FrameError::InvalidKeyLength(20))
        ));
    }
}
