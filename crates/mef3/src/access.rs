//! Two-level password hierarchy and AES encryption gate.
//!
//! Every MEF file carries two 16-byte validation fields in its universal
//! header:
//!
//! ```text
//! level_1_field = SHA-256(l1_password)[0..16]
//! level_2_field = SHA-256(l2_password)[0..16] XOR l1_password
//! ```
//!
//! A level-2 password therefore encodes the level-1 password, and level-2
//! access always implies level-1 access. Both fields are zero when the file
//! is unencrypted.

use crate::error::{MefError, Result};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of a padded password and of an AES-128 key.
pub const PASSWORD_BYTES: usize = 16;

/// Longest password accepted, in UTF-8 bytes (one byte stays NUL).
pub const MAX_PASSWORD_BYTES: usize = PASSWORD_BYTES - 1;

/// Width of a password validation field.
pub const VALIDATION_FIELD_BYTES: usize = 16;

/// AES block size.
pub const ENCRYPTION_BLOCK_BYTES: usize = 16;

/// Access granted by a password.
///
/// Ordered so that `Level2 > Level1 > Unencrypted > Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AccessLevel {
    /// The password matched neither field.
    Invalid,
    /// The file is not protected, or no password was given.
    #[default]
    Unencrypted,
    /// Level-1 password.
    Level1,
    /// Level-2 password (implies level 1).
    Level2,
}

impl AccessLevel {
    /// Status code: -1 invalid, 0 unencrypted, 1 level 1, 2 level 2.
    pub fn code(self) -> i8 {
        match self {
            Self::Invalid => -1,
            Self::Unencrypted => 0,
            Self::Level1 => 1,
            Self::Level2 => 2,
        }
    }
}

/// Encryption marker of a block, record or metadata section.
///
/// Negative values mark data that was encrypted on disk and has been
/// decrypted in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum EncryptionLevel {
    /// Never encrypted.
    #[default]
    None = 0,
    /// Encrypted with the level-1 key.
    Level1 = 1,
    /// Encrypted with the level-2 key.
    Level2 = 2,
    /// Level-1 data, currently decrypted.
    Level1Decrypted = -1,
    /// Level-2 data, currently decrypted.
    Level2Decrypted = -2,
}

impl EncryptionLevel {
    /// Creates an EncryptionLevel from its stored i8 value.
    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            -1 => Some(Self::Level1Decrypted),
            -2 => Some(Self::Level2Decrypted),
            _ => None,
        }
    }

    /// Returns the stored i8 value.
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// True while the data is still ciphertext.
    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::Level1 | Self::Level2)
    }

    /// Access level needed to decrypt.
    pub fn required_access(self) -> AccessLevel {
        match self {
            Self::None => AccessLevel::Unencrypted,
            Self::Level1 | Self::Level1Decrypted => AccessLevel::Level1,
            Self::Level2 | Self::Level2Decrypted => AccessLevel::Level2,
        }
    }

    /// The marker after decrypting.
    pub fn decrypted(self) -> Self {
        match self {
            Self::Level1 => Self::Level1Decrypted,
            Self::Level2 => Self::Level2Decrypted,
            other => other,
        }
    }

    /// The marker after (re-)encrypting.
    pub fn encrypted(self) -> Self {
        match self {
            Self::Level1Decrypted => Self::Level1,
            Self::Level2Decrypted => Self::Level2,
            other => other,
        }
    }
}

/// Password validation fields stored in a universal header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationFields {
    /// `SHA-256(l1)[0..16]`.
    pub level_1: [u8; VALIDATION_FIELD_BYTES],
    /// `SHA-256(l2)[0..16] XOR l1`.
    pub level_2: [u8; VALIDATION_FIELD_BYTES],
}

impl ValidationFields {
    /// True when the file carries no password protection.
    pub fn is_unencrypted(&self) -> bool {
        self.level_1.iter().all(|&b| b == 0)
    }

    /// Validates `password` against these fields.
    ///
    /// Never fails: an unusable password yields [`AccessLevel::Invalid`].
    pub fn check(&self, password: Option<&str>) -> AccessLevel {
        PasswordData::process(self, password).access_level()
    }
}

/// Pads `password` to [`PASSWORD_BYTES`] with NULs.
///
/// # Errors
///
/// Returns `MefError::Password` if the password is longer than
/// [`MAX_PASSWORD_BYTES`].
pub fn password_bytes(password: &str) -> Result<[u8; PASSWORD_BYTES]> {
    let raw = password.as_bytes();
    if raw.len() > MAX_PASSWORD_BYTES {
        return Err(MefError::Password(format!(
            "password exceeds {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    let mut padded = [0u8; PASSWORD_BYTES];
    padded[..raw.len()].copy_from_slice(raw);
    Ok(padded)
}

fn sha256_prefix(bytes: &[u8]) -> [u8; VALIDATION_FIELD_BYTES] {
    let digest = Sha256::digest(bytes);
    let mut prefix = [0u8; VALIDATION_FIELD_BYTES];
    prefix.copy_from_slice(&digest[..VALIDATION_FIELD_BYTES]);
    prefix
}

/// Passwords used when creating files.
#[derive(Clone, Default)]
pub struct Credentials {
    level_1: Option<[u8; PASSWORD_BYTES]>,
    level_2: Option<[u8; PASSWORD_BYTES]>,
    strongest: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("level_1", &self.level_1.is_some())
            .field("level_2", &self.level_2.is_some())
            .finish()
    }
}

impl Credentials {
    /// Builds credentials from optional passwords. Empty strings count as
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns `MefError::Password` if a level-2 password is given without a
    /// level-1 password, or a password is too long.
    pub fn new(level_1: Option<&str>, level_2: Option<&str>) -> Result<Self> {
        let level_1 = level_1.filter(|p| !p.is_empty());
        let level_2 = level_2.filter(|p| !p.is_empty());
        if level_2.is_some() && level_1.is_none() {
            return Err(MefError::Password(
                "level 2 password cannot be set without level 1 password".into(),
            ));
        }
        Ok(Self {
            level_1: level_1.map(password_bytes).transpose()?,
            level_2: level_2.map(password_bytes).transpose()?,
            strongest: level_2.or(level_1).map(str::to_string),
        })
    }

    /// The highest-level password, used to open existing files.
    pub fn password(&self) -> Option<&str> {
        self.strongest.as_deref()
    }

    /// Credentials for unprotected files.
    pub fn unencrypted() -> Self {
        Self::default()
    }

    /// True if a level-1 password was given.
    pub fn is_encrypted(&self) -> bool {
        self.level_1.is_some()
    }

    /// True if a level-2 password was given.
    pub fn has_level_2(&self) -> bool {
        self.level_2.is_some()
    }

    /// Derives the validation fields written into new files.
    pub fn validation_fields(&self) -> ValidationFields {
        let mut fields = ValidationFields::default();
        let Some(l1) = self.level_1 else {
            return fields;
        };
        fields.level_1 = sha256_prefix(&l1);
        if let Some(l2) = self.level_2 {
            let hash = sha256_prefix(&l2);
            for (i, slot) in fields.level_2.iter_mut().enumerate() {
                *slot = hash[i] ^ l1[i];
            }
        }
        fields
    }

    /// Key material with full access to everything these credentials
    /// protect.
    pub fn password_data(&self) -> PasswordData {
        let access_level = match (self.level_1, self.level_2) {
            (None, _) => AccessLevel::Unencrypted,
            (Some(_), None) => AccessLevel::Level1,
            (Some(_), Some(_)) => AccessLevel::Level2,
        };
        PasswordData {
            level_1_key: self.level_1,
            level_2_key: self.level_2,
            access_level,
        }
    }

    /// Default encryption of metadata section 2.
    pub fn section_2_encryption(&self) -> EncryptionLevel {
        if self.is_encrypted() {
            EncryptionLevel::Level1
        } else {
            EncryptionLevel::None
        }
    }

    /// Default encryption of metadata section 3.
    pub fn section_3_encryption(&self) -> EncryptionLevel {
        match (self.level_1, self.level_2) {
            (None, _) => EncryptionLevel::None,
            (Some(_), None) => EncryptionLevel::Level1,
            (Some(_), Some(_)) => EncryptionLevel::Level2,
        }
    }
}

/// Keys unlocked by validating a password against a file.
#[derive(Clone, Default)]
pub struct PasswordData {
    level_1_key: Option<[u8; PASSWORD_BYTES]>,
    level_2_key: Option<[u8; PASSWORD_BYTES]>,
    access_level: AccessLevel,
}

impl fmt::Debug for PasswordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordData")
            .field("access_level", &self.access_level)
            .finish_non_exhaustive()
    }
}

impl PasswordData {
    /// Validates `password` against `fields` and unlocks the matching keys.
    ///
    /// The level-1 check runs first. On mismatch, the password hash is XORed
    /// with the level-2 field to recover a candidate level-1 password, which
    /// must hash to the level-1 field.
    pub fn process(fields: &ValidationFields, password: Option<&str>) -> Self {
        if fields.is_unencrypted() {
            return Self::default();
        }
        let Some(password) = password.filter(|p| !p.is_empty()) else {
            return Self {
                access_level: AccessLevel::Invalid,
                ..Self::default()
            };
        };
        let Ok(padded) = password_bytes(password) else {
            return Self {
                access_level: AccessLevel::Invalid,
                ..Self::default()
            };
        };

        let hash = sha256_prefix(&padded);
        if hash == fields.level_1 {
            return Self {
                level_1_key: Some(padded),
                level_2_key: None,
                access_level: AccessLevel::Level1,
            };
        }

        let mut candidate = [0u8; PASSWORD_BYTES];
        for (i, slot) in candidate.iter_mut().enumerate() {
            *slot = hash[i] ^ fields.level_2[i];
        }
        if sha256_prefix(&candidate) == fields.level_1 {
            return Self {
                level_1_key: Some(candidate),
                level_2_key: Some(padded),
                access_level: AccessLevel::Level2,
            };
        }

        Self {
            access_level: AccessLevel::Invalid,
            ..Self::default()
        }
    }

    /// Access granted by the processed password.
    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    /// True if data marked with `level` may be decrypted.
    pub fn can_decrypt(&self, level: EncryptionLevel) -> bool {
        match level {
            EncryptionLevel::None => true,
            _ => self.access_level >= level.required_access(),
        }
    }

    fn cipher(&self, level: EncryptionLevel) -> Result<Option<Aes128>> {
        let key = match level.required_access() {
            AccessLevel::Level1 => self.level_1_key,
            AccessLevel::Level2 => self.level_2_key,
            _ => return Ok(None),
        };
        match key {
            Some(key) => Ok(Some(Aes128::new(&GenericArray::from(key)))),
            None => Err(MefError::AccessDenied(format!(
                "no key for encryption level {}",
                level.as_i8()
            ))),
        }
    }

    /// Encrypts `data` in place with the key of `level` (AES-128, ECB over
    /// 16-byte blocks). A no-op for [`EncryptionLevel::None`].
    ///
    /// # Errors
    ///
    /// Returns `MefError::AccessDenied` if the key is not unlocked and
    /// `MefError::Codec` if `data` is not a multiple of 16 bytes.
    pub fn encrypt(&self, level: EncryptionLevel, data: &mut [u8]) -> Result<()> {
        let Some(cipher) = self.cipher(level)? else {
            return Ok(());
        };
        check_block_multiple(data)?;
        for chunk in data.chunks_exact_mut(ENCRYPTION_BLOCK_BYTES) {
            cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        }
        Ok(())
    }

    /// Decrypts `data` in place. Counterpart of [`PasswordData::encrypt`].
    ///
    /// # Errors
    ///
    /// Same conditions as [`PasswordData::encrypt`].
    pub fn decrypt(&self, level: EncryptionLevel, data: &mut [u8]) -> Result<()> {
        let Some(cipher) = self.cipher(level)? else {
            return Ok(());
        };
        check_block_multiple(data)?;
        for chunk in data.chunks_exact_mut(ENCRYPTION_BLOCK_BYTES) {
            cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        }
        Ok(())
    }
}

fn check_block_multiple(data: &[u8]) -> Result<()> {
    if data.len() % ENCRYPTION_BLOCK_BYTES != 0 {
        return Err(MefError::Codec(format!(
            "encrypted region of {} bytes is not a multiple of {}",
            data.len(),
            ENCRYPTION_BLOCK_BYTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_2_requires_level_1() {
        let result = Credentials::new(None, Some("secret"));
        assert!(matches!(result, Err(MefError::Password(_))));
    }

    #[test]
    fn test_password_too_long() {
        assert!(password_bytes("0123456789abcde").is_ok());
        assert!(password_bytes("0123456789abcdef").is_err());
    }

    #[test]
    fn test_check_levels() {
        let creds = Credentials::new(Some("l1_pass"), Some("l2_pass")).unwrap();
        let fields = creds.validation_fields();

        assert_eq!(fields.check(Some("l1_pass")), AccessLevel::Level1);
        assert_eq!(fields.check(Some("l2_pass")), AccessLevel::Level2);
        assert_eq!(fields.check(Some("wrong")), AccessLevel::Invalid);
        assert_eq!(fields.check(None), AccessLevel::Invalid);
        assert_eq!(
            ValidationFields::default().check(Some("anything")),
            AccessLevel::Unencrypted
        );
    }

    #[test]
    fn test_level_2_unlocks_level_1_key() {
        let creds = Credentials::new(Some("alpha"), Some("beta")).unwrap();
        let fields = creds.validation_fields();

        let mut data = [7u8; 32];
        creds
            .password_data()
            .encrypt(EncryptionLevel::Level1, &mut data)
            .unwrap();
        assert_ne!(data, [7u8; 32]);

        // The level-1 key is recovered from the level-2 password alone.
        let unlocked = PasswordData::process(&fields, Some("beta"));
        assert!(unlocked.can_decrypt(EncryptionLevel::Level1));
        unlocked
            .decrypt(EncryptionLevel::Level1, &mut data)
            .unwrap();
        assert_eq!(data, [7u8; 32]);
    }

    #[test]
    fn test_level_1_cannot_decrypt_level_2() {
        let creds = Credentials::new(Some("alpha"), Some("beta")).unwrap();
        let level_1 = PasswordData::process(&creds.validation_fields(), Some("alpha"));

        assert!(level_1.can_decrypt(EncryptionLevel::None));
        assert!(level_1.can_decrypt(EncryptionLevel::Level1));
        assert!(!level_1.can_decrypt(EncryptionLevel::Level2));

        let mut data = [0u8; 16];
        let err = level_1.decrypt(EncryptionLevel::Level2, &mut data);
        assert!(matches!(err, Err(MefError::AccessDenied(_))));
    }

    #[test]
    fn test_unaligned_region_rejected() {
        let creds = Credentials::new(Some("alpha"), None).unwrap();
        let mut data = [0u8; 20];
        let err = creds
            .password_data()
            .encrypt(EncryptionLevel::Level1, &mut data);
        assert!(matches!(err, Err(MefError::Codec(_))));
    }

    #[test]
    fn test_encryption_level_markers() {
        assert_eq!(EncryptionLevel::Level1.decrypted(), EncryptionLevel::Level1Decrypted);
        assert_eq!(EncryptionLevel::Level2Decrypted.encrypted(), EncryptionLevel::Level2);
        assert!(!EncryptionLevel::Level2Decrypted.is_encrypted());
        assert_eq!(EncryptionLevel::from_i8(-2), Some(EncryptionLevel::Level2Decrypted));
        assert_eq!(EncryptionLevel::from_i8(3), None);
        assert_eq!(AccessLevel::Invalid.code(), -1);
        assert!(AccessLevel::Level2 > AccessLevel::Level1);
    }
}
