//! Vault context and command dispatch.
//!
//! [`Vault`] owns every piece of mutable state: the lifecycle flag, the
//! PIN and PUK, the transport cipher derived at provisioning, and the
//! master-secret bookkeeping. Commands are processed strictly one at a
//! time; each handler validates addressing parameters, then the state
//! precondition, then authentication, decodes any encrypted operand, and
//! only then performs its effect.

use alloc::vec;
use alloc::vec::Vec;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::apdu::{CommandApdu, Instruction, Response, StatusWord};
use crate::codec::{self, BLOCK_SIZE, ENVELOPE_PAYLOAD_MAX, ENVELOPE_SIZE, TransportCipher};
use crate::error::VaultError;
use crate::files::{FileId, FileStore};
use crate::secret::GuardedSecret;
use crate::state::VaultState;

/// Reference width of the PIN; shorter PINs are zero-padded.
pub const PIN_LENGTH: usize = 16;

/// Minimum accepted PIN length at provisioning and reset.
pub const PIN_MIN_LENGTH: usize = 2;

/// Fixed width of the system-generated PUK.
pub const PUK_LENGTH: usize = 8;

/// Attempt budget shared by both secrets.
pub const MAX_ATTEMPTS: u8 = 3;

/// Presence flag answered by VerifyPin when a master secret is stored.
pub const MASTER_PRESENT: u8 = 0x01;

/// Presence flag answered by VerifyPin when no master secret is stored.
pub const MASTER_ABSENT: u8 = 0x02;

/// Lock-clearing policy: `Locked` persists through a PUK-backed PIN reset
/// and is cleared by the next successful PIN verification.
pub const LOCK_CLEAR_ON_VERIFY: bool = true;

/// Master-secret bookkeeping; the content itself lives in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct MasterRecord {
    present: bool,
    length: u8,
}

impl MasterRecord {
    fn clear(&mut self) {
        *self = Self::default();
    }

    const fn flag(self) -> u8 {
        if self.present {
            MASTER_PRESENT
        } else {
            MASTER_ABSENT
        }
    }
}

/// The vault: all mutable state plus the two injected collaborators.
pub struct Vault<S, R> {
    state: VaultState,
    pin: GuardedSecret<PIN_LENGTH>,
    puk: GuardedSecret<PUK_LENGTH>,
    cipher: Option<TransportCipher>,
    master: MasterRecord,
    store: S,
    rng: R,
}

impl<S, R> Vault<S, R>
where
    S: FileStore,
    R: RngCore + CryptoRng,
{
    /// Fresh, unprovisioned vault over the given collaborators.
    pub fn new(store: S, rng: R) -> Self {
        Self {
            state: VaultState::Uninitialized,
            pin: GuardedSecret::new(MAX_ATTEMPTS),
            puk: GuardedSecret::new(MAX_ATTEMPTS),
            cipher: None,
            master: MasterRecord::default(),
            store,
            rng,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> VaultState {
        self.state
    }

    /// Borrow the storage collaborator.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Session activation.
    ///
    /// When both secrets are exhausted the vault is terminal: the four
    /// logical files are purged first, then the locked status is
    /// reported. Otherwise the response carries the state byte.
    pub fn select(&mut self) -> Response {
        if self.terminal() {
            self.purge();
            self.state = VaultState::Locked;
            return Response::status_only(StatusWord::Locked);
        }
        Response::success(vec![self.state.as_byte()])
    }

    /// Session end: authentication does not survive deselection, attempt
    /// counters do.
    pub fn deselect(&mut self) {
        self.pin.reset_session();
        self.puk.reset_session();
    }

    /// Process one command buffer and produce the response.
    pub fn process(&mut self, request: &[u8]) -> Response {
        let apdu = match CommandApdu::parse(request) {
            Ok(apdu) => apdu,
            Err(err) => return Response::status_only(err.status()),
        };
        match self.dispatch(&apdu) {
            Ok(response) => response,
            Err(err) => Response::status_only(err.status()),
        }
    }

    fn dispatch(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        if self.terminal() {
            return Err(VaultError::Locked);
        }
        match apdu.ins {
            Instruction::Provision => self.provision(apdu),
            Instruction::VerifyPin => self.verify_pin(apdu),
            Instruction::ChangePin => self.change_pin(apdu),
            Instruction::ResetPin => self.reset_pin(apdu),
            Instruction::WipeCard => self.wipe_card(apdu),
            Instruction::SetMasterSecret => self.set_master_secret(apdu),
            Instruction::GetMasterSecret => self.get_master_secret(apdu),
            Instruction::DeleteMasterSecret => self.delete_master_secret(apdu),
            Instruction::CreateDataFiles => self.create_data_files(apdu),
            Instruction::WriteData => self.write_data(apdu),
            Instruction::ReadData => self.read_data(apdu),
            Instruction::DeleteDataFiles => self.delete_data_files(apdu),
            Instruction::GetFileSizes => self.get_file_sizes(apdu),
            Instruction::GetFileName => self.get_file_name(apdu),
        }
    }

    // Provision: derive the transport key from the chosen PIN, store the
    // padded PIN, generate and answer the PUK.
    fn provision(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        require_params(apdu, 0x00, 0x01)?;
        if self.state != VaultState::Uninitialized {
            return Err(VaultError::NotAllowed);
        }
        if apdu.data.len() < PIN_MIN_LENGTH || apdu.data.len() > PIN_LENGTH {
            return Err(VaultError::BadLength);
        }

        self.cipher = Some(TransportCipher::from_pin(apdu.data));
        self.pin.update(apdu.data);

        let mut puk = [0u8; PUK_LENGTH];
        self.rng.fill_bytes(&mut puk);
        self.puk.update(&puk);

        self.master.clear();
        self.state = VaultState::Empty;
        Ok(Response::success(puk.to_vec()))
    }

    // VerifyPin: plain (P2=0x00) or one sentinel-trimmed block (P2=0x01).
    // Success answers the master-secret presence flag.
    fn verify_pin(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let encrypted = match (apdu.p1, apdu.p2) {
            (0x01, 0x00) => false,
            (0x01, 0x01) => true,
            _ => return Err(VaultError::BadParameters),
        };
        if self.state == VaultState::Uninitialized {
            return Err(VaultError::NotAllowed);
        }

        let candidate = if encrypted {
            if apdu.data.len() != BLOCK_SIZE {
                return Err(VaultError::BadLength);
            }
            self.decode_pin_block(apdu.data)?
        } else {
            if apdu.data.len() > PIN_LENGTH {
                return Err(VaultError::BadLength);
            }
            Zeroizing::new(apdu.data.to_vec())
        };

        self.check_pin(&candidate)?;
        Ok(Response::success(vec![self.master.flag()]))
    }

    // ChangePin: old and new PIN, each pre-padded to the full width, as
    // one 32-byte plain payload or two independently trimmed blocks.
    fn change_pin(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let encrypted = match (apdu.p1, apdu.p2) {
            (0x00, 0x01) => true,
            (0x00, 0x02) => false,
            _ => return Err(VaultError::BadParameters),
        };
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        let operand = if encrypted {
            if apdu.data.len() != 2 * BLOCK_SIZE {
                return Err(VaultError::BadLength);
            }
            let old = self.decode_pin_block(&apdu.data[..BLOCK_SIZE])?;
            let new = self.decode_pin_block(&apdu.data[BLOCK_SIZE..])?;
            let mut joined = Zeroizing::new(Vec::with_capacity(old.len() + new.len()));
            joined.extend_from_slice(&old);
            joined.extend_from_slice(&new);
            joined
        } else {
            Zeroizing::new(apdu.data.to_vec())
        };
        if operand.len() != 2 * PIN_LENGTH {
            return Err(VaultError::BadLength);
        }

        let (old, new) = operand.split_at(PIN_LENGTH);
        self.check_pin(old)?;
        self.pin.update(new);
        Ok(Response::success(Vec::new()))
    }

    // ResetPin: only legal once the PIN is exhausted. PUK alone probes the
    // recovery secret; PUK plus a new PIN rewrites the reference. The
    // locked state itself stays until the next successful verification.
    fn reset_pin(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let encrypted = match (apdu.p1, apdu.p2) {
            (0x01, 0x01) => true,
            (0x01, 0x02) => false,
            _ => return Err(VaultError::BadParameters),
        };
        if self.state == VaultState::Uninitialized {
            return Err(VaultError::NotAllowed);
        }
        if !self.pin.is_exhausted() {
            return Err(VaultError::AuthFailed {
                remaining: self.pin.remaining_attempts(),
            });
        }

        let (puk_candidate, new_pin) = if encrypted {
            match apdu.data.len() {
                BLOCK_SIZE => (self.decode_puk_block(apdu.data)?, None),
                len if len == 2 * BLOCK_SIZE => (
                    self.decode_puk_block(&apdu.data[..BLOCK_SIZE])?,
                    Some(self.decode_pin_block(&apdu.data[BLOCK_SIZE..])?),
                ),
                _ => return Err(VaultError::BadLength),
            }
        } else {
            match apdu.data.len() {
                PUK_LENGTH => (Zeroizing::new(apdu.data.to_vec()), None),
                len if len > PUK_LENGTH => (
                    Zeroizing::new(apdu.data[..PUK_LENGTH].to_vec()),
                    Some(Zeroizing::new(apdu.data[PUK_LENGTH..].to_vec())),
                ),
                _ => return Err(VaultError::BadLength),
            }
        };

        self.check_puk(&puk_candidate)?;

        let Some(new_pin) = new_pin else {
            return Ok(Response::status_only(StatusWord::PukConfirmed));
        };
        if new_pin.len() < PIN_MIN_LENGTH || new_pin.len() > PIN_LENGTH {
            return Err(VaultError::BadLength);
        }
        self.pin.update(&new_pin);
        Ok(Response::success(Vec::new()))
    }

    // WipeCard: PUK-confirmed full wipe back to the factory state.
    fn wipe_card(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let encrypted = match (apdu.p1, apdu.p2) {
            (0x00, 0x01) => true,
            (0x00, 0x00) => false,
            _ => return Err(VaultError::BadParameters),
        };
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        let puk_candidate = if encrypted {
            if apdu.data.len() != BLOCK_SIZE {
                return Err(VaultError::BadLength);
            }
            self.decode_puk_block(apdu.data)?
        } else {
            if apdu.data.len() != PUK_LENGTH {
                return Err(VaultError::BadLength);
            }
            Zeroizing::new(apdu.data.to_vec())
        };
        self.check_puk(&puk_candidate)?;

        self.purge();
        self.cipher = None;
        self.pin.reset_session();
        self.puk.reset_session();
        self.state = VaultState::Uninitialized;
        Ok(Response::success(Vec::new()))
    }

    // SetMasterSecret: raw payload or one 48-byte length-prefixed
    // envelope. An existing record is replaced.
    fn set_master_secret(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let encrypted = match (apdu.p1, apdu.p2) {
            (0x01, 0x01) => true,
            (0x02, 0x01) => false,
            _ => return Err(VaultError::BadParameters),
        };
        if self.state == VaultState::Uninitialized {
            return Err(VaultError::NotAllowed);
        }
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        let secret: Zeroizing<Vec<u8>> = if encrypted {
            if apdu.data.len() != ENVELOPE_SIZE {
                return Err(VaultError::BadLength);
            }
            let block = Zeroizing::new(
                self.cipher()?
                    .decrypt(apdu.data)
                    .map_err(|_| VaultError::BadLength)?,
            );
            let payload = codec::open_envelope(&block).map_err(|_| VaultError::BadLength)?;
            Zeroizing::new(payload.to_vec())
        } else {
            if apdu.data.len() > ENVELOPE_PAYLOAD_MAX {
                return Err(VaultError::BadLength);
            }
            Zeroizing::new(apdu.data.to_vec())
        };

        if self.master.present {
            self.store.delete(FileId::MasterSecret);
            self.master.clear();
        }
        self.store.create(FileId::MasterSecret, secret.len())?;
        self.store.write(FileId::MasterSecret, 0, &secret)?;
        self.master = MasterRecord {
            present: true,
            length: secret.len() as u8,
        };
        Ok(Response::success(Vec::new()))
    }

    // GetMasterSecret: raw bytes, or the sealed 48-byte envelope.
    fn get_master_secret(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let encrypted = match (apdu.p1, apdu.p2) {
            (0x01, 0x02) => true,
            (0x02, 0x02) => false,
            _ => return Err(VaultError::BadParameters),
        };
        if self.state == VaultState::Uninitialized || !self.master.present {
            return Err(VaultError::NotAllowed);
        }
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        let secret = Zeroizing::new(self.store.read(
            FileId::MasterSecret,
            0,
            self.master.length as usize,
        )?);
        if encrypted {
            let envelope = Zeroizing::new(
                codec::seal_envelope(&secret).map_err(|_| VaultError::BadLength)?,
            );
            let sealed = self
                .cipher()?
                .encrypt(&envelope[..])
                .map_err(|_| VaultError::BadLength)?;
            Ok(Response::success(sealed))
        } else {
            Ok(Response::success(secret.to_vec()))
        }
    }

    fn delete_master_secret(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        require_params(apdu, 0x02, 0x03)?;
        if self.state == VaultState::Uninitialized || !self.master.present {
            return Err(VaultError::NotAllowed);
        }
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        self.store.delete(FileId::MasterSecret);
        self.master.clear();
        Ok(Response::success(Vec::new()))
    }

    // CreateDataFiles: two 2-byte sizes plus the display name; only legal
    // while no blobs exist.
    fn create_data_files(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        require_params(apdu, 0x03, 0x01)?;
        if self.state != VaultState::Empty {
            return Err(VaultError::NotAllowed);
        }
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }
        if apdu.data.len() < 4 {
            return Err(VaultError::BadLength);
        }

        let primary = read_u16(&apdu.data[0..2]) as usize;
        let secondary = read_u16(&apdu.data[2..4]) as usize;
        let name = &apdu.data[4..];

        if let Err(err) = self.allocate_data_files(primary, secondary, name) {
            self.store.delete(FileId::DataPrimary);
            self.store.delete(FileId::DataSecondary);
            self.store.delete(FileId::Name);
            return Err(err);
        }
        self.state = VaultState::HasData;
        Ok(Response::success(Vec::new()))
    }

    fn allocate_data_files(
        &mut self,
        primary: usize,
        secondary: usize,
        name: &[u8],
    ) -> Result<(), VaultError> {
        self.store.create(FileId::DataPrimary, primary)?;
        self.store.create(FileId::DataSecondary, secondary)?;
        self.store.create(FileId::Name, name.len())?;
        self.store.write(FileId::Name, 0, name)?;
        Ok(())
    }

    // WriteData: 2-byte file offset followed by the bytes to store.
    fn write_data(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let target = data_target(apdu)?;
        self.require_data_state()?;
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }
        if apdu.data.len() < 2 {
            return Err(VaultError::BadLength);
        }

        let offset = read_u16(&apdu.data[..2]) as usize;
        self.store.write(target, offset, &apdu.data[2..])?;
        Ok(Response::success(Vec::new()))
    }

    // ReadData: 2-byte file offset and 2-byte length.
    fn read_data(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        let target = data_target(apdu)?;
        self.require_data_state()?;
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }
        if apdu.data.len() != 4 {
            return Err(VaultError::BadLength);
        }

        let offset = read_u16(&apdu.data[..2]) as usize;
        let length = read_u16(&apdu.data[2..4]) as usize;
        Ok(Response::success(self.store.read(target, offset, length)?))
    }

    // DeleteDataFiles: P2 selects primary-plus-name, secondary, or all.
    fn delete_data_files(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        if apdu.p1 != 0x03 {
            return Err(VaultError::BadParameters);
        }
        let selection: &[FileId] = match apdu.p2 {
            0x01 => &[FileId::DataPrimary, FileId::Name],
            0x02 => &[FileId::DataSecondary],
            0x03 => &[FileId::DataPrimary, FileId::DataSecondary, FileId::Name],
            _ => return Err(VaultError::BadParameters),
        };
        self.require_data_state()?;
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        for id in selection {
            self.store.delete(*id);
        }
        self.state = VaultState::Empty;
        Ok(Response::success(Vec::new()))
    }

    // GetFileSizes: both blob sizes, big-endian; zero for a missing blob.
    fn get_file_sizes(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        require_params(apdu, 0x03, 0x04)?;
        if self.state == VaultState::Uninitialized {
            return Err(VaultError::NotAllowed);
        }
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&file_size_u16(&self.store, FileId::DataPrimary).to_be_bytes());
        data.extend_from_slice(&file_size_u16(&self.store, FileId::DataSecondary).to_be_bytes());
        Ok(Response::success(data))
    }

    fn get_file_name(&mut self, apdu: &CommandApdu<'_>) -> Result<Response, VaultError> {
        require_params(apdu, 0x01, 0x01)?;
        self.require_data_state()?;
        if !self.pin.is_validated() {
            return Err(VaultError::AuthRequired);
        }

        let length = self.store.size(FileId::Name);
        Ok(Response::success(self.store.read(FileId::Name, 0, length)?))
    }

    /// Both secrets exhausted: the terminal, unrecoverable condition.
    fn terminal(&self) -> bool {
        self.pin.is_exhausted() && self.puk.is_exhausted()
    }

    /// Run the PIN check, escalating exhaustion to the locked state and
    /// clearing the lock on a successful verification.
    fn check_pin(&mut self, candidate: &[u8]) -> Result<(), VaultError> {
        if self.pin.check(candidate) {
            if self.state == VaultState::Locked && LOCK_CLEAR_ON_VERIFY {
                self.state = self.data_state();
            }
            return Ok(());
        }
        if self.pin.is_exhausted() {
            self.state = VaultState::Locked;
        }
        Err(VaultError::AuthFailed {
            remaining: self.pin.remaining_attempts(),
        })
    }

    fn check_puk(&mut self, candidate: &[u8]) -> Result<(), VaultError> {
        if self.puk.check(candidate) {
            Ok(())
        } else {
            Err(VaultError::AuthFailed {
                remaining: self.puk.remaining_attempts(),
            })
        }
    }

    /// State a cleared lock falls back to: `HasData` only while the blob
    /// pair actually exists.
    fn data_state(&self) -> VaultState {
        if self.store.exists(FileId::DataPrimary) && self.store.exists(FileId::DataSecondary) {
            VaultState::HasData
        } else {
            VaultState::Empty
        }
    }

    fn require_data_state(&self) -> Result<(), VaultError> {
        match self.state {
            VaultState::Uninitialized | VaultState::Empty => Err(VaultError::NotAllowed),
            VaultState::HasData | VaultState::Locked => Ok(()),
        }
    }

    /// Decode one sentinel-trimmed PIN block.
    fn decode_pin_block(&self, block: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let plain = Zeroizing::new(
            self.cipher()?
                .decrypt(block)
                .map_err(|_| VaultError::BadLength)?,
        );
        Ok(Zeroizing::new(codec::trim_sentinel(&plain).to_vec()))
    }

    /// Decode one PUK block: the recovery secret sits right-aligned and
    /// the filler is never scanned (a random PUK may contain 0xFF).
    fn decode_puk_block(&self, block: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let plain = Zeroizing::new(
            self.cipher()?
                .decrypt(block)
                .map_err(|_| VaultError::BadLength)?,
        );
        Ok(Zeroizing::new(plain[BLOCK_SIZE - PUK_LENGTH..].to_vec()))
    }

    fn cipher(&self) -> Result<&TransportCipher, VaultError> {
        self.cipher.as_ref().ok_or(VaultError::NotAllowed)
    }

    /// Remove every logical file and the master-secret bookkeeping.
    fn purge(&mut self) {
        for id in FileId::ALL {
            self.store.delete(id);
        }
        self.master.clear();
    }
}

fn require_params(apdu: &CommandApdu<'_>, p1: u8, p2: u8) -> Result<(), VaultError> {
    if apdu.p1 == p1 && apdu.p2 == p2 {
        Ok(())
    } else {
        Err(VaultError::BadParameters)
    }
}

fn data_target(apdu: &CommandApdu<'_>) -> Result<FileId, VaultError> {
    if apdu.p1 != 0x03 {
        return Err(VaultError::BadParameters);
    }
    match apdu.p2 {
        0x01 => Ok(FileId::DataPrimary),
        0x02 => Ok(FileId::DataSecondary),
        _ => Err(VaultError::BadParameters),
    }
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn file_size_u16<S: FileStore>(store: &S, id: FileId) -> u16 {
    u16::try_from(store.size(id)).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MemoryFileStore;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn fresh_vault() -> Vault<MemoryFileStore, ChaCha20Rng> {
        Vault::new(MemoryFileStore::new(), ChaCha20Rng::from_seed([7u8; 32]))
    }

    fn provision(vault: &mut Vault<MemoryFileStore, ChaCha20Rng>, pin: &[u8]) -> Vec<u8> {
        let apdu = CommandApdu {
            ins: Instruction::Provision,
            p1: 0x00,
            p2: 0x01,
            data: pin,
        };
        let response = vault.process(&apdu.to_bytes());
        assert_eq!(response.status, StatusWord::Ok);
        response.data
    }

    #[test]
    fn provision_rejects_repeat_and_bad_lengths() {
        let mut vault = fresh_vault();
        let err = vault
            .provision(&CommandApdu {
                ins: Instruction::Provision,
                p1: 0x00,
                p2: 0x01,
                data: b"1",
            })
            .expect_err("one-byte PIN");
        assert_eq!(err, VaultError::BadLength);

        provision(&mut vault, b"1234");
        let err = vault
            .provision(&CommandApdu {
                ins: Instruction::Provision,
                p1: 0x00,
                p2: 0x01,
                data: b"5678",
            })
            .expect_err("second provision");
        assert_eq!(err, VaultError::NotAllowed);
    }

    #[test]
    fn provisioning_answers_full_width_puk() {
        let mut vault = fresh_vault();
        let puk = provision(&mut vault, b"1234");
        assert_eq!(puk.len(), PUK_LENGTH);
        assert_eq!(vault.state(), VaultState::Empty);
    }

    #[test]
    fn verify_rejects_unknown_addressing() {
        let mut vault = fresh_vault();
        provision(&mut vault, b"1234");
        let err = vault
            .verify_pin(&CommandApdu {
                ins: Instruction::VerifyPin,
                p1: 0x02,
                p2: 0x00,
                data: b"1234",
            })
            .expect_err("bad addressing");
        assert_eq!(err, VaultError::BadParameters);
        // Parameter rejection happens before the check: no attempt burned.
        assert_eq!(vault.pin.remaining_attempts(), MAX_ATTEMPTS);
    }

    #[test]
    fn lock_falls_back_to_empty_without_blobs() {
        let mut vault = fresh_vault();
        provision(&mut vault, b"1234");
        assert_eq!(vault.data_state(), VaultState::Empty);
        vault.state = VaultState::Locked;
        vault.pin.update(b"5678");
        vault.check_pin(b"5678").expect("verify");
        assert_eq!(vault.state(), VaultState::Empty);
    }

    #[test]
    fn terminal_vault_refuses_every_command() {
        let mut vault = fresh_vault();
        provision(&mut vault, b"1234");
        for _ in 0..MAX_ATTEMPTS {
            let _ = vault.check_pin(b"0000");
        }
        for _ in 0..MAX_ATTEMPTS {
            let _ = vault.check_puk(b"wrong puk");
        }
        assert!(vault.terminal());

        let response = vault.process(&CommandApdu {
            ins: Instruction::GetFileSizes,
            p1: 0x03,
            p2: 0x04,
            data: &[],
        }
        .to_bytes());
        assert_eq!(response.status, StatusWord::Locked);
    }

    #[test]
    fn terminal_select_purges_files_first() {
        let mut vault = fresh_vault();
        provision(&mut vault, b"1234");
        vault.check_pin(b"1234").expect("verify");
        vault
            .set_master_secret(&CommandApdu {
                ins: Instruction::SetMasterSecret,
                p1: 0x02,
                p2: 0x01,
                data: b"hunter2",
            })
            .expect("set master");
        assert!(vault.store().exists(FileId::MasterSecret));

        for _ in 0..MAX_ATTEMPTS {
            let _ = vault.check_pin(b"0000");
        }
        for _ in 0..MAX_ATTEMPTS {
            let _ = vault.check_puk(b"wrong puk");
        }

        let response = vault.select();
        assert_eq!(response.status, StatusWord::Locked);
        assert!(!vault.store().exists(FileId::MasterSecret));
        for id in FileId::ALL {
            assert!(!vault.store().exists(id));
        }

        // Still terminal on the next activation.
        assert_eq!(vault.select().status, StatusWord::Locked);
    }

    #[test]
    fn wipe_requires_validated_pin() {
        let mut vault = fresh_vault();
        provision(&mut vault, b"1234");
        let err = vault
            .wipe_card(&CommandApdu {
                ins: Instruction::WipeCard,
                p1: 0x00,
                p2: 0x00,
                data: &[0u8; PUK_LENGTH],
            })
            .expect_err("no verification yet");
        assert_eq!(err, VaultError::AuthRequired);
    }
}
