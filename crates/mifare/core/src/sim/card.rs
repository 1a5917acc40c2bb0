//! In-memory DESFire card

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::driver::{
    Aid, CardDriver, CommMode, ComponentVersion, DesfireKey, DriverResult, KeyKind, Status, TagKind,
    VersionInfo, codes,
};

/// Driver call selector for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum SimOp {
    Connect,
    Disconnect,
    GetVersion,
    GetKeySettings,
    GetKeyVersion,
    FreeMem,
    SelectApplication,
    Authenticate,
    ChangeKeySettings,
    FormatPicc,
    CreateApplication,
    CreateStdDataFile,
    ReadData,
    WriteData,
}

/// One accepted WriteData call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Selected application
    pub aid: Aid,
    /// Target file
    pub file_no: u8,
    /// Offset within the file
    pub offset: u32,
    /// Bytes written
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct Fault {
    op: SimOp,
    skip: u32,
    times: u32,
    code: u32,
}

#[derive(Debug)]
struct SimFile {
    data: Vec<u8>,
}

#[derive(Debug)]
struct SimApp {
    settings: u8,
    key_count: u8,
    files: BTreeMap<u8, SimFile>,
}

#[derive(Debug)]
struct SimState {
    version: VersionInfo,
    picc_settings: u8,
    key: Vec<u8>,
    apps: BTreeMap<Aid, SimApp>,
    selected: Option<Aid>,
    authenticated: bool,
    connected: bool,
    last_error: u32,
    faults: Vec<Fault>,
    calls: BTreeMap<SimOp, u32>,
    journal: Vec<WriteRecord>,
}

type SimResult<T> = Result<T, u32>;

impl SimState {
    fn app(&self) -> SimResult<&SimApp> {
        let aid = self.selected.ok_or(codes::PERMISSION_DENIED)?;
        self.apps.get(&aid).ok_or(codes::APPLICATION_NOT_FOUND)
    }

    fn app_mut(&mut self) -> SimResult<&mut SimApp> {
        let aid = self.selected.ok_or(codes::PERMISSION_DENIED)?;
        self.apps.get_mut(&aid).ok_or(codes::APPLICATION_NOT_FOUND)
    }

    fn file_mut(&mut self, file_no: u8) -> SimResult<&mut SimFile> {
        self.app_mut()?.files.get_mut(&file_no).ok_or(codes::FILE_NOT_FOUND)
    }

    fn key_count(&self) -> SimResult<u8> {
        match self.selected {
            None => Ok(1),
            Some(_) => Ok(self.app()?.key_count),
        }
    }

    fn settings(&self) -> SimResult<u8> {
        match self.selected {
            None => Ok(self.picc_settings),
            Some(_) => Ok(self.app()?.settings),
        }
    }

    fn used(&self) -> usize {
        self.apps.values().flat_map(|app| app.files.values()).map(|file| file.data.len()).sum()
    }

    fn require_auth(&self) -> SimResult<()> {
        if self.authenticated { Ok(()) } else { Err(codes::AUTHENTICATION_ERROR) }
    }

    fn create_app(&mut self, aid: Aid, settings: u8, key_count: u8) -> SimResult<()> {
        if self.selected.is_some() {
            return Err(codes::PERMISSION_DENIED);
        }
        if self.picc_settings & 0x04 == 0 {
            self.require_auth()?;
        }
        if self.apps.contains_key(&aid) {
            return Err(codes::DUPLICATE_ERROR);
        }
        self.apps.insert(aid, SimApp { settings, key_count: key_count & 0x0F, files: BTreeMap::new() });
        Ok(())
    }

    fn create_file(&mut self, file_no: u8, size: u32) -> SimResult<()> {
        if self.app()?.settings & 0x04 == 0 {
            self.require_auth()?;
        }
        let app = self.app_mut()?;
        if app.files.contains_key(&file_no) {
            return Err(codes::DUPLICATE_ERROR);
        }
        app.files.insert(file_no, SimFile { data: vec![0; size as usize] });
        Ok(())
    }
}

/// Shared state of a simulated card
///
/// Clones share the same card, so a test can keep one to inspect what the
/// code under test did through the tag handle.
#[derive(Clone)]
pub struct SimCard {
    uid: String,
    kind: TagKind,
    state: Arc<Mutex<SimState>>,
}

impl SimCard {
    /// Factory fresh DESFire EV1 with 4 KiB of storage
    pub fn desfire(uid: &str) -> Self {
        Self::desfire_with_version(uid, 1, 0x18)
    }

    /// Factory fresh DESFire with the given software major version and storage size exponent
    pub fn desfire_with_version(uid: &str, software_major: u8, storage_size: u8) -> Self {
        let mut raw_uid = [0u8; 7];
        if let Ok(bytes) = hex::decode(uid) {
            let n = bytes.len().min(raw_uid.len());
            raw_uid[..n].copy_from_slice(&bytes[..n]);
        }
        let component = ComponentVersion {
            vendor_id: 0x04,
            kind: 0x01,
            subtype: 0x01,
            version_major: 1,
            version_minor: 0,
            storage_size,
            protocol: 0x05,
        };
        let version = VersionInfo {
            uid: raw_uid,
            batch_number: [0xBA, 0x5C, 0x00, 0x00, 0x01],
            production_week: 0x21,
            production_year: 0x19,
            hardware: component,
            software: ComponentVersion { version_major: software_major, ..component },
        };
        Self::with_kind(uid, TagKind::Desfire, version)
    }

    /// MIFARE Ultralight, which only shows up in scans
    pub fn ultralight(uid: &str) -> Self {
        Self::with_kind(uid, TagKind::Ultralight, VersionInfo::default())
    }

    fn with_kind(uid: &str, kind: TagKind, version: VersionInfo) -> Self {
        Self {
            uid: uid.to_string(),
            kind,
            state: Arc::new(Mutex::new(SimState {
                version,
                picc_settings: 0x0F,
                key: vec![0; KeyKind::Des.key_len()],
                apps: BTreeMap::new(),
                selected: None,
                authenticated: false,
                connected: false,
                last_error: 0,
                faults: Vec::new(),
                calls: BTreeMap::new(),
                journal: Vec::new(),
            })),
        }
    }

    /// Hex encoded UID
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Driver handle for this card
    pub fn tag(&self) -> SimTag {
        SimTag { card: self.clone() }
    }

    /// Fail the next `times` calls of `op` with `code`
    pub fn inject_fault(&self, op: SimOp, code: u32, times: u32) {
        self.inject_fault_after(op, 0, code, times);
    }

    /// Let `skip` calls of `op` pass, then fail the following `times` calls with `code`
    pub fn inject_fault_after(&self, op: SimOp, skip: u32, code: u32, times: u32) {
        self.state.lock().faults.push(Fault { op, skip, times, code });
    }

    /// Number of calls of `op` so far, failed ones included
    pub fn calls(&self, op: SimOp) -> u32 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every accepted WriteData call, oldest first
    pub fn journal(&self) -> Vec<WriteRecord> {
        self.state.lock().journal.clone()
    }

    /// Contents of a file
    pub fn file_contents(&self, aid: Aid, file_no: u8) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.apps.get(&aid)?.files.get(&file_no).map(|file| file.data.clone())
    }

    /// Overwrite part of a file, bypassing the protocol
    pub fn poke(&self, aid: Aid, file_no: u8, offset: usize, data: &[u8]) -> bool {
        let mut state = self.state.lock();
        let Some(file) = state.apps.get_mut(&aid).and_then(|app| app.files.get_mut(&file_no)) else {
            return false;
        };
        let Some(target) = file.data.get_mut(offset..offset + data.len()) else {
            return false;
        };
        target.copy_from_slice(data);
        true
    }

    /// Identifiers of all applications
    pub fn applications(&self) -> Vec<Aid> {
        self.state.lock().apps.keys().copied().collect()
    }

    /// PICC master key settings
    pub fn picc_key_settings(&self) -> u8 {
        self.state.lock().picc_settings
    }

    /// Replace the PICC master key settings
    pub fn set_picc_key_settings(&self, settings: u8) {
        self.state.lock().picc_settings = settings;
    }

    /// Replace the key accepted by authentication
    pub fn set_key(&self, material: &[u8]) {
        self.state.lock().key = material.to_vec();
    }

    /// Whether a tag handle is connected
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn run<R>(&self, op: SimOp, f: impl FnOnce(&mut SimState) -> SimResult<R>) -> DriverResult<R> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_insert(0) += 1;

        let injected = state.faults.iter_mut().find(|fault| fault.op == op && fault.times > 0).and_then(
            |fault| {
                if fault.skip > 0 {
                    fault.skip -= 1;
                    None
                } else {
                    fault.times -= 1;
                    Some(fault.code)
                }
            },
        );

        let result = match injected {
            Some(code) => Err(code),
            None if !state.connected && !matches!(op, SimOp::Connect | SimOp::Disconnect) => {
                Err(codes::SCARD_E_INVALID_HANDLE)
            }
            None => f(&mut state),
        };

        result.map_err(|code| {
            state.last_error = code;
            Status::FAILED
        })
    }
}

impl fmt::Debug for SimCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimCard").field("uid", &self.uid).field("kind", &self.kind).finish()
    }
}

/// Driver handle of a [`SimCard`]
#[derive(Debug, Clone)]
pub struct SimTag {
    card: SimCard,
}

impl SimTag {
    /// The simulated card behind this handle
    pub const fn card(&self) -> &SimCard {
        &self.card
    }
}

impl CardDriver for SimTag {
    fn uid(&self) -> String {
        self.card.uid.clone()
    }

    fn kind(&self) -> TagKind {
        self.card.kind
    }

    fn friendly_name(&self) -> String {
        match self.card.kind {
            TagKind::Desfire => "Mifare DESFire",
            TagKind::Ultralight => "Mifare UltraLight",
            TagKind::Classic => "Mifare Classic",
            TagKind::Other => "Unknown",
        }
        .to_string()
    }

    fn connect(&self) -> DriverResult<()> {
        self.card.run(SimOp::Connect, |state| {
            state.connected = true;
            state.selected = None;
            state.authenticated = false;
            Ok(())
        })
    }

    fn disconnect(&self) -> DriverResult<()> {
        self.card.run(SimOp::Disconnect, |state| {
            state.connected = false;
            state.authenticated = false;
            Ok(())
        })
    }

    fn last_error(&self) -> u32 {
        self.card.state.lock().last_error
    }

    fn clear_error(&self) {
        self.card.state.lock().last_error = codes::OPERATION_OK;
    }

    fn error_string(&self) -> String {
        codes::describe(self.last_error()).to_string()
    }

    fn last_picc_error(&self) -> u8 {
        u8::try_from(self.last_error()).unwrap_or(0)
    }

    fn get_version(&self) -> DriverResult<VersionInfo> {
        self.card.run(SimOp::GetVersion, |state| Ok(state.version))
    }

    fn get_key_settings(&self) -> DriverResult<(u8, u8)> {
        self.card.run(SimOp::GetKeySettings, |state| {
            let settings = state.settings()?;
            if state.selected.is_none() && settings & 0x02 == 0 {
                state.require_auth()?;
            }
            Ok((settings, state.key_count()?))
        })
    }

    fn get_key_version(&self, key_no: u8) -> DriverResult<u8> {
        self.card.run(SimOp::GetKeyVersion, |state| {
            if key_no >= state.key_count()? { Err(codes::NO_SUCH_KEY) } else { Ok(0) }
        })
    }

    fn free_mem(&self) -> DriverResult<u32> {
        self.card.run(SimOp::FreeMem, |state| {
            let total = state.version.storage_bytes() as usize;
            Ok(total.saturating_sub(state.used()) as u32)
        })
    }

    fn select_application(&self, aid: Option<Aid>) -> DriverResult<()> {
        self.card.run(SimOp::SelectApplication, |state| {
            let aid = aid.filter(|aid| *aid != Aid::PICC);
            if let Some(aid) = aid {
                if !state.apps.contains_key(&aid) {
                    return Err(codes::APPLICATION_NOT_FOUND);
                }
            }
            state.selected = aid;
            state.authenticated = false;
            Ok(())
        })
    }

    fn authenticate(&self, key_no: u8, key: &DesfireKey) -> DriverResult<()> {
        self.card.run(SimOp::Authenticate, |state| {
            state.authenticated = false;
            if key_no >= state.key_count()? {
                return Err(codes::NO_SUCH_KEY);
            }
            if key.material() != state.key.as_slice() {
                return Err(codes::AUTHENTICATION_ERROR);
            }
            state.authenticated = true;
            Ok(())
        })
    }

    fn change_key_settings(&self, settings: u8) -> DriverResult<()> {
        self.card.run(SimOp::ChangeKeySettings, |state| {
            state.require_auth()?;
            if state.settings()? & 0x08 == 0 {
                return Err(codes::PERMISSION_DENIED);
            }
            match state.selected {
                None => state.picc_settings = settings,
                Some(_) => state.app_mut()?.settings = settings,
            }
            Ok(())
        })
    }

    fn format_picc(&self) -> DriverResult<()> {
        self.card.run(SimOp::FormatPicc, |state| {
            if state.selected.is_some() {
                return Err(codes::PERMISSION_DENIED);
            }
            state.require_auth()?;
            state.apps.clear();
            Ok(())
        })
    }

    fn create_application(&self, aid: Aid, settings: u8, key_count: u8) -> DriverResult<()> {
        self.card.run(SimOp::CreateApplication, |state| state.create_app(aid, settings, key_count))
    }

    fn create_application_iso(
        &self,
        aid: Aid,
        settings: u8,
        key_count: u8,
        _iso_file_id: u16,
        df_name: &[u8],
    ) -> DriverResult<()> {
        self.card.run(SimOp::CreateApplication, |state| {
            if df_name.len() > 16 {
                return Err(codes::LENGTH_ERROR);
            }
            state.create_app(aid, settings, key_count)
        })
    }

    fn create_std_data_file(
        &self,
        file_no: u8,
        _comm: CommMode,
        _access_rights: u16,
        size: u32,
    ) -> DriverResult<()> {
        self.card.run(SimOp::CreateStdDataFile, |state| state.create_file(file_no, size))
    }

    fn create_std_data_file_iso(
        &self,
        file_no: u8,
        _comm: CommMode,
        _access_rights: u16,
        size: u32,
        _iso_file_id: u16,
    ) -> DriverResult<()> {
        self.card.run(SimOp::CreateStdDataFile, |state| state.create_file(file_no, size))
    }

    fn read_data(&self, file_no: u8, offset: u32, len: usize) -> DriverResult<Vec<u8>> {
        self.card.run(SimOp::ReadData, |state| {
            let file = state.file_mut(file_no)?;
            let start = offset as usize;
            let end = if len == 0 { file.data.len() } else { start + len };
            file.data.get(start..end).map(<[u8]>::to_vec).ok_or(codes::BOUNDARY_ERROR)
        })
    }

    fn write_data(&self, file_no: u8, offset: u32, data: &[u8]) -> DriverResult<usize> {
        self.card.run(SimOp::WriteData, |state| {
            let aid = state.selected.ok_or(codes::PERMISSION_DENIED)?;
            let file = state.file_mut(file_no)?;
            let start = offset as usize;
            let target = file.data.get_mut(start..start + data.len()).ok_or(codes::BOUNDARY_ERROR)?;
            target.copy_from_slice(data);
            state.journal.push(WriteRecord { aid, file_no, offset, data: data.to_vec() });
            Ok(data.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_need_connection() {
        let card = SimCard::desfire("04010203040506");
        let tag = card.tag();

        assert!(tag.get_version().is_err());
        assert_eq!(tag.last_error(), codes::SCARD_E_INVALID_HANDLE);

        tag.connect().unwrap();
        assert_eq!(tag.get_version().unwrap().uid, [0x04, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_fault_injection_skips_then_fails() {
        let card = SimCard::desfire("04010203040506");
        let tag = card.tag();
        tag.connect().unwrap();
        card.inject_fault_after(SimOp::FreeMem, 1, codes::ILLEGAL_COMMAND_CODE, 1);

        assert!(tag.free_mem().is_ok());
        assert!(tag.free_mem().is_err());
        assert_eq!(tag.last_error(), codes::ILLEGAL_COMMAND_CODE);
        assert_eq!(tag.last_picc_error(), 0x1C);
        assert!(tag.free_mem().is_ok());
        assert_eq!(card.calls(SimOp::FreeMem), 3);
    }

    #[test]
    fn test_authentication_rules() {
        let card = SimCard::desfire("04010203040506");
        let tag = card.tag();
        tag.connect().unwrap();

        assert!(tag.format_picc().is_err());
        assert_eq!(tag.last_error(), codes::AUTHENTICATION_ERROR);

        let wrong = DesfireKey::new(KeyKind::Des, &[1; 8], true, None).unwrap();
        assert!(tag.authenticate(0, &wrong).is_err());
        assert!(tag.authenticate(1, &DesfireKey::default_des()).is_err());
        assert_eq!(tag.last_error(), codes::NO_SUCH_KEY);

        tag.authenticate(0, &DesfireKey::default_des()).unwrap();
        tag.format_picc().unwrap();
    }
}
