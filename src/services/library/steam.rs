//! Steam library and account scanning.
//!
//! Phase 1 reads every `appmanifest_<id>.acf` in every library root: those games are
//! installed, and an account owns one when its config files mention the id as a quoted
//! token. Phase 2 walks each account's owned-apps table and adds games that are not
//! installed, merging owners when several accounts own the same id.

use super::GameScanner;
use crate::models::{AccountProfile, GameRecord, OwnerRef, Platform, UNKNOWN_USERNAME};
use crate::services::keyvalue::{self, KeyValueDocument, KeyValueNode};
use crate::services::name_cache::AppNameCache;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::{Arc, LazyLock};

/// Offset between a 32-bit account id (userdata folder name) and a SteamID64.
pub const STEAM_ID64_BASE: u64 = 76_561_197_960_265_728;

static MANIFEST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^appmanifest_(\d+)\.acf$").expect("Invalid manifest regex"));

pub fn steam_id64(id3: u64) -> u64 {
    id3 + STEAM_ID64_BASE
}

pub fn icon_url(app_id: &str) -> String {
    format!(
        "https://cdn.cloudflare.steamstatic.com/steam/apps/{}/header.jpg",
        app_id
    )
}

pub fn login_users_path(root: &Utf8Path) -> Utf8PathBuf {
    root.join("config").join("loginusers.vdf")
}

/// The user table of `loginusers.vdf`, nested under `users` or at the root.
fn users_table(doc: &KeyValueDocument) -> &KeyValueNode {
    doc.get_ignore_case("users").unwrap_or(doc.root())
}

/// SteamID64 of the `loginusers.vdf` entry whose `AccountName` is `account_name`.
pub fn find_login_user(doc: &KeyValueDocument, account_name: &str) -> Option<String> {
    users_table(doc)
        .as_mapping()?
        .iter()
        .find(|(_, user)| {
            user.str_ignore_case("AccountName")
                .is_some_and(|name| name.eq_ignore_ascii_case(account_name))
        })
        .map(|(id, _)| id.clone())
}

/// Scans one Steam installation.
pub struct SteamScanner {
    root: Option<Utf8PathBuf>,
    names: Arc<AppNameCache>,
}

impl SteamScanner {
    pub fn new(root: Option<Utf8PathBuf>, names: Arc<AppNameCache>) -> Self {
        Self { root, names }
    }

    pub fn root(&self) -> Option<&Utf8Path> {
        self.root.as_deref()
    }

    fn local_config(root: &Utf8Path, id3: &str) -> Utf8PathBuf {
        root.join("userdata").join(id3).join("config").join("localconfig.vdf")
    }

    fn shared_config(root: &Utf8Path, id3: &str) -> Utf8PathBuf {
        root.join("userdata")
            .join(id3)
            .join("7")
            .join("remote")
            .join("sharedconfig.vdf")
    }

    /// Primary root plus every extra root from `libraryfolders.vdf`.
    ///
    /// Handles the modern `"0" { "path" "..." }` entries and the legacy `"1" "D:\\Games"`
    /// form. The primary root is never listed twice.
    pub fn library_folders(root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut folders = vec![root.to_path_buf()];
        let index = root.join("steamapps").join("libraryfolders.vdf");
        if !index.exists() {
            return folders;
        }

        let doc = match keyvalue::read_document(&index) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("Skipping library index: {:#}", e);
                return folders;
            }
        };

        let Some(entries) = doc
            .get_ignore_case("libraryfolders")
            .and_then(KeyValueNode::as_mapping)
        else {
            return folders;
        };

        for (key, entry) in entries {
            if !key.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let path = match entry {
                KeyValueNode::Mapping(_) => entry.str_ignore_case("path"),
                KeyValueNode::Scalar(s) => Some(s.as_str()).filter(|s| !s.is_empty()),
            };
            let Some(path) = path else { continue };

            let known = folders
                .iter()
                .any(|f| f.as_str().eq_ignore_ascii_case(path));
            if !known {
                folders.push(Utf8PathBuf::from(path));
            }
        }

        folders
    }

    /// Accounts from `userdata/<id3>` joined with `loginusers.vdf`.
    pub fn accounts(root: &Utf8Path) -> Vec<AccountProfile> {
        let login_path = login_users_path(root);
        let login_users = match keyvalue::read_document(&login_path) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::debug!("No login users: {:#}", e);
                None
            }
        };

        let Ok(entries) = fs::read_dir(root.join("userdata")) else {
            return Vec::new();
        };

        let mut ids: Vec<(u64, String)> = entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let id3 = name.parse::<u64>().ok()?;
                Some((id3, name))
            })
            .collect();
        ids.sort();

        ids.into_iter()
            .map(|(id3, name)| {
                let id64 = steam_id64(id3).to_string();
                let user = login_users
                    .as_ref()
                    .and_then(|doc| users_table(doc).get(&id64));

                let display_name = user
                    .and_then(|u| u.str_ignore_case("PersonaName"))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("User {}", name));
                let username = user
                    .and_then(|u| u.str_ignore_case("AccountName"))
                    .unwrap_or(UNKNOWN_USERNAME);

                AccountProfile::new(Platform::Steam, name, display_name, username)
            })
            .collect()
    }

    /// Substring check for `"<app_id>"` in the account's config files.
    ///
    /// A heuristic, not a structural ownership query: an id that appears quoted anywhere
    /// in the file counts.
    fn owns(root: &Utf8Path, id3: &str, app_id: &str) -> bool {
        let needle = format!("\"{}\"", app_id);
        [Self::local_config(root, id3), Self::shared_config(root, id3)]
            .iter()
            .any(|path| {
                fs::read_to_string(path)
                    .map(|text| text.contains(&needle))
                    .unwrap_or(false)
            })
    }

    fn owner(account: &AccountProfile) -> OwnerRef {
        OwnerRef::new(&account.id, &account.display_name, &account.username)
    }

    /// Phase 1.
    fn installed_games(root: &Utf8Path, accounts: &[AccountProfile]) -> Vec<GameRecord> {
        let mut games = Vec::new();
        let mut seen = HashSet::new();

        for library in Self::library_folders(root) {
            let steamapps = library.join("steamapps");
            let Ok(entries) = fs::read_dir(&steamapps) else {
                tracing::debug!("Library folder not readable: {}", steamapps);
                continue;
            };

            let mut manifests: Vec<(String, Utf8PathBuf)> = entries
                .flatten()
                .filter_map(|e| {
                    let file_name = e.file_name().into_string().ok()?;
                    let id = MANIFEST_PATTERN.captures(&file_name)?.get(1)?.as_str().to_string();
                    Some((id, steamapps.join(&file_name)))
                })
                .collect();
            manifests.sort();

            for (file_id, path) in manifests {
                let doc = match keyvalue::read_document(&path) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::warn!("Skipping manifest: {:#}", e);
                        continue;
                    }
                };
                let Some(app) = doc.get_ignore_case("AppState") else {
                    tracing::warn!("Skipping manifest without AppState: {}", path);
                    continue;
                };

                let app_id = app.str_ignore_case("appid").unwrap_or(file_id.as_str()).to_string();
                if !seen.insert(app_id.clone()) {
                    continue;
                }

                let mut game = GameRecord::new(
                    Platform::Steam,
                    &app_id,
                    app.str_ignore_case("name").unwrap_or_default(),
                );
                game.installed = true;
                game.icon_ref = icon_url(&app_id);
                if let Some(install_dir) = app.str_ignore_case("installdir") {
                    game.install_path =
                        Some(steamapps.join("common").join(install_dir).into_string());
                }

                for account in accounts {
                    if Self::owns(root, &account.id, &app_id) {
                        game.add_owner(Self::owner(account));
                    }
                }

                games.push(game);
            }
        }

        games
    }

    /// Owned-apps tables of one account: `localconfig.vdf` and `sharedconfig.vdf`.
    fn owned_app_tables(root: &Utf8Path, id3: &str) -> Vec<KeyValueDocument> {
        [Self::local_config(root, id3), Self::shared_config(root, id3)]
            .into_iter()
            .filter(|p| p.exists())
            .filter_map(|path| match keyvalue::read_document(&path) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!("Skipping account config: {:#}", e);
                    None
                }
            })
            .collect()
    }

    fn apps_of(doc: &KeyValueDocument) -> Option<&KeyValueNode> {
        doc.get_path_ignore_case(&["UserLocalConfigStore", "Software", "Valve", "Steam", "apps"])
            .or_else(|| {
                doc.get_path_ignore_case(&[
                    "UserRoamableConfigStore",
                    "Software",
                    "Valve",
                    "Steam",
                    "Apps",
                ])
            })
    }

    fn embedded_name(details: &KeyValueNode) -> Option<&str> {
        details.str_ignore_case("name").or_else(|| {
            details
                .get_path_ignore_case(&["common", "name"])
                .and_then(KeyValueNode::as_str)
                .filter(|s| !s.is_empty())
        })
    }

    /// Phase 2: merge owned-but-not-installed games into `catalog`.
    fn owned_games(&self, root: &Utf8Path, accounts: &[AccountProfile], catalog: &mut Vec<GameRecord>) {
        let installed: HashSet<String> = catalog.iter().map(|g| g.id.clone()).collect();
        let mut index: HashMap<String, usize> = HashMap::new();

        for account in accounts {
            for doc in Self::owned_app_tables(root, &account.id) {
                let Some(apps) = Self::apps_of(&doc).and_then(KeyValueNode::as_mapping) else {
                    continue;
                };

                for (app_id, details) in apps {
                    if installed.contains(app_id) || !app_id.chars().all(|c| c.is_ascii_digit()) {
                        continue;
                    }

                    let name = Self::embedded_name(details)
                        .map(str::to_string)
                        .or_else(|| self.names.resolve(app_id))
                        .unwrap_or_default();

                    match index.get(app_id) {
                        Some(&i) => {
                            let game = &mut catalog[i];
                            game.add_owner(Self::owner(account));
                            game.upgrade_name(&name);
                        }
                        None => {
                            let mut game = GameRecord::new(Platform::Steam, app_id, name);
                            game.icon_ref = icon_url(app_id);
                            game.add_owner(Self::owner(account));
                            index.insert(app_id.clone(), catalog.len());
                            catalog.push(game);
                        }
                    }
                }
            }
        }
    }
}

impl GameScanner for SteamScanner {
    fn platform(&self) -> Platform {
        Platform::Steam
    }

    fn scan_games(&self) -> Vec<GameRecord> {
        let Some(root) = self.root.as_deref() else {
            return Vec::new();
        };

        let accounts = Self::accounts(root);
        let mut games = Self::installed_games(root, &accounts);
        let installed = games.len();
        self.owned_games(root, &accounts, &mut games);

        tracing::info!(
            "Steam: {} installed, {} owned but not installed",
            installed,
            games.len() - installed
        );
        games
    }

    fn scan_accounts(&self) -> Vec<AccountProfile> {
        self.root.as_deref().map(Self::accounts).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::name_cache::MockCatalogSource;
    use tempfile::TempDir;

    fn offline_names() -> Arc<AppNameCache> {
        let mut source = MockCatalogSource::new();
        source.expect_fetch().returning(|| None);
        Arc::new(AppNameCache::new(None, Box::new(source)))
    }

    fn root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_steam_id64() {
        assert_eq!(steam_id64(22202), 76561197960287930);
    }

    #[test]
    fn test_library_folders_both_formats() {
        let tmp = TempDir::new().unwrap();
        let root = root(&tmp);
        fs::create_dir_all(root.join("steamapps")).unwrap();
        fs::write(
            root.join("steamapps/libraryfolders.vdf"),
            format!(
                "\"libraryfolders\"\n{{\n\t\"contentstatsid\"\t\"1\"\n\t\"0\"\n\t{{\n\t\t\"path\"\t\t\"{}\"\n\t}}\n\t\"1\"\n\t{{\n\t\t\"path\"\t\t\"/mnt/games\"\n\t}}\n\t\"2\"\t\t\"/mnt/legacy\"\n}}\n",
                root.as_str().to_uppercase()
            ),
        )
        .unwrap();

        let folders = SteamScanner::library_folders(&root);
        assert_eq!(
            folders,
            vec![
                root.clone(),
                Utf8PathBuf::from("/mnt/games"),
                Utf8PathBuf::from("/mnt/legacy"),
            ]
        );
    }

    #[test]
    fn test_accounts_from_userdata_and_login_users() {
        let tmp = TempDir::new().unwrap();
        let root = root(&tmp);
        fs::create_dir_all(root.join("userdata/22202")).unwrap();
        fs::create_dir_all(root.join("userdata/33303")).unwrap();
        fs::create_dir_all(root.join("userdata/anonymous")).unwrap();
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(
            root.join("config/loginusers.vdf"),
            "\"users\"\n{\n\t\"76561197960287930\"\n\t{\n\t\t\"AccountName\"\t\t\"alice\"\n\t\t\"PersonaName\"\t\t\"Alice\"\n\t}\n}\n",
        )
        .unwrap();

        let accounts = SteamScanner::accounts(&root);
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "22202");
        assert_eq!(accounts[0].username, "alice");
        assert_eq!(accounts[0].display_name, "Alice");
        assert_eq!(accounts[1].username, UNKNOWN_USERNAME);
        assert_eq!(accounts[1].display_name, "User 33303");
    }

    #[test]
    fn test_find_login_user_case_insensitive() {
        let doc = KeyValueDocument::parse(
            "\"users\" { \"76561197960287930\" { \"AccountName\" \"Alice\" } }",
        )
        .unwrap();
        assert_eq!(
            find_login_user(&doc, "alice").as_deref(),
            Some("76561197960287930")
        );
        assert_eq!(find_login_user(&doc, "bob"), None);

        // Root-level table
        let doc =
            KeyValueDocument::parse("\"76561197960287931\" { \"AccountName\" \"bob\" }").unwrap();
        assert_eq!(find_login_user(&doc, "bob").as_deref(), Some("76561197960287931"));
    }

    #[test]
    fn test_unparsable_manifest_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = root(&tmp);
        fs::create_dir_all(root.join("steamapps")).unwrap();
        fs::write(root.join("steamapps/appmanifest_1.acf"), "\"AppState\" {").unwrap();
        fs::write(
            root.join("steamapps/appmanifest_620.acf"),
            "\"AppState\" { \"appid\" \"620\" \"name\" \"Portal 2\" \"installdir\" \"Portal 2\" }",
        )
        .unwrap();

        let scanner = SteamScanner::new(Some(root.clone()), offline_names());
        let games = scanner.scan_games();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].name, "Portal 2");
        assert_eq!(
            games[0].install_path.as_deref(),
            Some(root.join("steamapps/common/Portal 2").as_str())
        );
    }

    #[test]
    fn test_embedded_common_name_and_placeholder() {
        let tmp = TempDir::new().unwrap();
        let root = root(&tmp);
        fs::create_dir_all(root.join("userdata/22202/config")).unwrap();
        fs::write(
            root.join("userdata/22202/config/localconfig.vdf"),
            "\"UserLocalConfigStore\" { \"Software\" { \"Valve\" { \"Steam\" { \"apps\" {\n\
             \"10\" { \"common\" { \"name\" \"Counter-Strike\" } }\n\
             \"999999\" { \"LastPlayed\" \"0\" }\n\
             \"notanid\" { }\n\
             } } } } }",
        )
        .unwrap();

        let scanner = SteamScanner::new(Some(root), offline_names());
        let games = scanner.scan_games();
        let names: HashSet<&str> = games.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(games.len(), 2);
        assert!(names.contains("Counter-Strike"));
        assert!(names.contains("Steam App 999999"));
    }

    #[test]
    fn test_no_root_yields_nothing() {
        let scanner = SteamScanner::new(None, offline_names());
        assert!(scanner.scan_games().is_empty());
        assert!(scanner.scan_accounts().is_empty());
    }
}
