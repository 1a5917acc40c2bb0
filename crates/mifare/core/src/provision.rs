//! Card formatting and NDEF application setup

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    Result, Step,
    driver::{CardDriver, CommMode, DesfireKey},
    ndef::capability::{self, MappingVersion},
    session::CardSession,
    transport::CardTransport,
};

/// Key settings applied to the NDEF application
const NDEF_APP_SETTINGS_V1: u8 = 0x09;
const NDEF_APP_SETTINGS_V2: u8 = 0x0F;
/// Setting bit that allows changing the key settings
const CONFIG_CHANGEABLE: u8 = 0x08;
/// One key, 2 byte ISO file identifiers enabled
const NDEF_APP_KEYS_V2: u8 = 0x21;
const NDEF_APP_ISO_FILE_ID: u16 = 0xE110;
/// NFC Forum Type 4 tag application name
const NDEF_DF_NAME: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];

const CC_ACCESS_RIGHTS: u16 = 0xE000;
const NDEF_ACCESS_RIGHTS: u16 = 0xEEE0;
const CC_ISO_FILE_ID: u16 = 0xE103;
const NDEF_ISO_FILE_ID: u16 = 0xE104;
const NDEF_FILE_NO_V1: u8 = 0x04;
const NDEF_FILE_NO_V2: u8 = 0x02;
const NDEF_SIZE_V1: u16 = 0x0EE0;

/// PICC master key settings applied while formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormatOptions {
    /// Master key settings may change later
    pub config_changeable: bool,
    /// Applications may be created and deleted without the master key
    pub free_create_delete: bool,
    /// Applications may be listed without the master key
    pub free_directory_list: bool,
    /// The master key may change
    pub key_changeable: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            config_changeable: true,
            free_create_delete: true,
            free_directory_list: true,
            key_changeable: true,
        }
    }
}

impl FormatOptions {
    /// Key settings byte encoding these options
    pub const fn key_settings(&self) -> u8 {
        (self.config_changeable as u8) << 3
            | (self.free_create_delete as u8) << 2
            | (self.free_directory_list as u8) << 1
            | self.key_changeable as u8
    }
}

/// Master key information decoded from the PICC key settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterKeyInfo {
    /// Master key settings may change
    pub config_changeable: bool,
    /// Applications may be created and deleted without the master key
    pub free_create_delete: bool,
    /// Applications may be listed without the master key
    pub free_directory_list: bool,
    /// The master key may change
    pub key_changeable: bool,
    /// Number of keys at PICC level
    pub max_keys: u8,
}

impl MasterKeyInfo {
    /// Decode a settings byte and key count
    pub const fn from_settings(settings: u8, max_keys: u8) -> Self {
        Self {
            config_changeable: settings & 0x08 != 0,
            free_create_delete: settings & 0x04 != 0,
            free_directory_list: settings & 0x02 != 0,
            key_changeable: settings & 0x01 != 0,
            max_keys,
        }
    }
}

/// Erase the card and apply `options` to the master key
///
/// Requires the master key to still be the factory default.
#[instrument(level = "debug", skip(session))]
pub fn format<T: CardTransport>(session: &CardSession<'_, T>, options: FormatOptions) -> Result<()> {
    let key = DesfireKey::default_des();
    let settings = options.key_settings();

    session.retry(Step::Authenticate, |tag| tag.authenticate(0, &key))?;
    session.retry(Step::ChangeKeySettings, |tag| tag.change_key_settings(settings))?;
    session.retry(Step::FormatPicc, |tag| tag.format_picc())?;

    info!(settings = format_args!("{settings:#04X}"), "Card formatted");
    Ok(())
}

/// Create the NDEF application, capability container and NDEF file
///
/// The layout follows the mapping version chosen from the card's software
/// version.
#[instrument(level = "debug", skip_all)]
pub fn create_ndef<T: CardTransport>(session: &CardSession<'_, T>) -> Result<MappingVersion> {
    let version = session.retry(Step::GetVersion, |tag| tag.get_version())?;
    let mapping = MappingVersion::from_software_major(version.software.version_major);
    let key = DesfireKey::default_des();

    session.retry(Step::SelectApplication, |tag| tag.select_application(None))?;
    session.retry(Step::Authenticate, |tag| tag.authenticate(0, &key))?;

    match mapping {
        MappingVersion::V1 => create_v1(session, &key)?,
        MappingVersion::V2 => create_v2(session, &key, version.software.storage_size)?,
    }

    info!(?mapping, "Ndef application created");
    Ok(mapping)
}

fn create_v1<T: CardTransport>(session: &CardSession<'_, T>, key: &DesfireKey) -> Result<()> {
    let mapping = MappingVersion::V1;

    let (settings, _) = session.retry(Step::GetKeySettings, |tag| tag.get_key_settings())?;
    if settings & CONFIG_CHANGEABLE != 0 {
        session.retry(Step::ChangeKeySettings, |tag| tag.change_key_settings(NDEF_APP_SETTINGS_V1))?;
    }

    session.retry(Step::CreateApplication, |tag| {
        tag.create_application(mapping.aid(), NDEF_APP_SETTINGS_V1, 1)
    })?;
    session.retry(Step::SelectApplication, |tag| tag.select_application(Some(mapping.aid())))?;
    session.retry(Step::Authenticate, |tag| tag.authenticate(0, key))?;
    session.retry(Step::ChangeKeySettings, |tag| tag.change_key_settings(NDEF_APP_SETTINGS_V1))?;

    let cc_file = mapping.cc_file_no();
    session.retry(Step::CreateCcFile, |tag| {
        tag.create_std_data_file(cc_file, CommMode::Plain, CC_ACCESS_RIGHTS, capability::CC_MIN_LEN as u32)
    })?;

    let cc = capability::build(mapping, NDEF_SIZE_V1);
    session.retry(Step::WriteCc, |tag| tag.write_data(cc_file, 0, &cc))?;

    session.retry(Step::CreateNdefFile, |tag| {
        tag.create_std_data_file(NDEF_FILE_NO_V1, CommMode::Plain, NDEF_ACCESS_RIGHTS, u32::from(NDEF_SIZE_V1))
    })?;

    debug!(size = NDEF_SIZE_V1, "Created mapping v1 ndef file");
    Ok(())
}

fn create_v2<T: CardTransport>(
    session: &CardSession<'_, T>,
    key: &DesfireKey,
    storage_size: u8,
) -> Result<()> {
    let mapping = MappingVersion::V2;

    session.retry(Step::CreateApplication, |tag| {
        tag.create_application_iso(
            mapping.aid(),
            NDEF_APP_SETTINGS_V2,
            NDEF_APP_KEYS_V2,
            NDEF_APP_ISO_FILE_ID,
            &NDEF_DF_NAME,
        )
    })?;
    session.retry(Step::SelectApplication, |tag| tag.select_application(Some(mapping.aid())))?;
    session.retry(Step::Authenticate, |tag| tag.authenticate(0, key))?;

    let cc_file = mapping.cc_file_no();
    session.retry(Step::CreateCcFileIso, |tag| {
        tag.create_std_data_file_iso(
            cc_file,
            CommMode::Plain,
            CC_ACCESS_RIGHTS,
            capability::CC_MIN_LEN as u32,
            CC_ISO_FILE_ID,
        )
    })?;

    let size = capability::capacity_for_storage(storage_size);
    let cc = capability::build(mapping, size);
    session.retry(Step::WriteCcIso, |tag| tag.write_data(cc_file, 0, &cc))?;

    session.retry(Step::CreateNdefFileIso, |tag| {
        tag.create_std_data_file_iso(
            NDEF_FILE_NO_V2,
            CommMode::Plain,
            NDEF_ACCESS_RIGHTS,
            u32::from(size),
            NDEF_ISO_FILE_ID,
        )
    })?;

    debug!(size, "Created mapping v2 ndef file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_options_bits() {
        assert_eq!(FormatOptions::default().key_settings(), 0x0F);

        let options = FormatOptions {
            config_changeable: true,
            free_create_delete: false,
            free_directory_list: true,
            key_changeable: false,
        };
        assert_eq!(options.key_settings(), 0x0A);
    }

    #[test]
    fn test_format_options_partial_json() {
        let options: FormatOptions = serde_json::from_str(r#"{"keyChangeable": false}"#).unwrap();
        assert_eq!(options.key_settings(), 0x0E);
    }

    #[test]
    fn test_master_key_info_decodes() {
        let info = MasterKeyInfo::from_settings(0x0B, 1);
        assert!(info.config_changeable);
        assert!(!info.free_create_delete);
        assert!(info.free_directory_list);
        assert!(info.key_changeable);
        assert_eq!(info.max_keys, 1);
    }
}
