//! Account pool: discovery of account descriptors on disk, ordered traversal,
//! and dead-lettering (quarantine) of accounts that can no longer log in.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    domain::{Account, AccountMeta, DeadLetter},
    Result,
};

const DESCRIPTOR_EXT: &str = "json";
const DEAD_ENTRY_NAME: &str = "dead";

/// Ordered accounts for one run plus a monotonic cursor.
///
/// Every account is handed out at most once; the cursor never moves back.
#[derive(Debug)]
pub struct AccountPool {
    dead_dir: PathBuf,
    accounts: Vec<Account>,
    cursor: usize,
    dead: Vec<DeadLetter>,
}

impl AccountPool {
    /// Scan `accounts_dir` for `*.json` descriptors in filename order.
    ///
    /// A missing or unreadable directory yields an empty pool. A descriptor
    /// that fails to parse is kept with empty metadata.
    pub fn discover(accounts_dir: &Path, dead_dir: &Path) -> Self {
        let accounts = match discover_accounts(accounts_dir) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(dir = %accounts_dir.display(), "cannot scan accounts dir: {e}");
                Vec::new()
            }
        };
        tracing::info!(count = accounts.len(), "discovered accounts");
        Self::from_accounts(accounts, dead_dir)
    }

    pub fn from_accounts(accounts: Vec<Account>, dead_dir: &Path) -> Self {
        Self {
            dead_dir: dead_dir.to_path_buf(),
            accounts,
            cursor: 0,
            dead: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.accounts.len()
    }

    /// Hand out the next unvisited account and advance the cursor by one.
    pub fn next_account(&mut self) -> Option<Account> {
        let acc = self.accounts.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(acc)
    }

    /// Quarantine an account: move its session and descriptor into the dead
    /// directory. The account is out of the run either way; a failed move is
    /// only logged.
    pub fn mark_dead(&mut self, account: &Account, reason: &str) {
        if let Err(e) = quarantine(account, &self.dead_dir) {
            tracing::error!(account = %account.label(), "failed to move account to dead dir: {e}");
        } else {
            tracing::warn!(account = %account.label(), reason, "account moved to dead dir");
        }
        self.dead.push(DeadLetter {
            account: account.label(),
            reason: reason.to_string(),
        });
    }

    pub fn dead_letters(&self) -> &[DeadLetter] {
        &self.dead
    }
}

fn discover_accounts(dir: &Path) -> Result<Vec<Account>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name != DEAD_ENTRY_NAME)
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(DESCRIPTOR_EXT))
        })
        .collect();
    names.sort();

    let accounts = names
        .into_iter()
        .map(|name| {
            let descriptor = dir.join(&name);
            let meta = read_meta(&descriptor);
            let session = resolve_session_path(dir, &descriptor, meta.session_file.as_deref());
            Account::new(session, Some(descriptor), meta)
        })
        .collect();
    Ok(accounts)
}

fn read_meta(path: &Path) -> AccountMeta {
    let parsed = fs::read_to_string(path)
        .map_err(crate::Error::from)
        .and_then(|raw| serde_json::from_str::<AccountMeta>(&raw).map_err(crate::Error::from));
    match parsed {
        Ok(meta) => meta,
        Err(e) => {
            tracing::error!(path = %path.display(), "failed to load account descriptor: {e}");
            AccountMeta::default()
        }
    }
}

/// Pick the session file for a descriptor.
///
/// An explicit `session_file` wins (relative names resolve to
/// `<dir>/<basename>`). Otherwise `<stem>_telethon.session` is used when it
/// exists, else `<stem>.session` whether or not it exists; a missing file
/// surfaces at connect time.
pub fn resolve_session_path(dir: &Path, descriptor: &Path, explicit: Option<&str>) -> PathBuf {
    if let Some(explicit) = explicit.filter(|s| !s.trim().is_empty()) {
        let p = Path::new(explicit);
        if p.is_absolute() {
            return p.to_path_buf();
        }
        return match p.file_name() {
            Some(name) => dir.join(name),
            None => dir.join(p),
        };
    }

    let stem = descriptor
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let preferred = dir.join(format!("{stem}_telethon.session"));
    if preferred.exists() {
        preferred
    } else {
        dir.join(format!("{stem}.session"))
    }
}

fn quarantine(account: &Account, dead_dir: &Path) -> Result<()> {
    fs::create_dir_all(dead_dir)?;
    move_into(&account.session_path, dead_dir)?;
    if let Some(descriptor) = &account.descriptor_path {
        move_into(descriptor, dead_dir)?;
    }
    Ok(())
}

fn move_into(src: &Path, dir: &Path) -> Result<()> {
    if !src.exists() {
        return Ok(());
    }
    let Some(name) = src.file_name() else {
        return Ok(());
    };
    let dst = dir.join(name);
    if fs::rename(src, &dst).is_err() {
        // Different filesystem: fall back to copy + remove.
        fs::copy(src, &dst)?;
        fs::remove_file(src)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn discovers_descriptors_in_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "b.json", r#"{"app_id": 1, "app_hash": "h"}"#);
        write(dir, "a.JSON", "{}");
        write(dir, "a.session", "");
        write(dir, "notes.txt", "ignored");
        fs::create_dir(dir.join("dead")).unwrap();

        let mut pool = AccountPool::discover(dir, &dir.join("dead"));
        assert_eq!(pool.len(), 2);

        let first = pool.next_account().unwrap();
        assert_eq!(first.descriptor_path, Some(dir.join("a.JSON")));
        assert_eq!(first.session_path, dir.join("a.session"));

        let second = pool.next_account().unwrap();
        assert_eq!(second.meta_app_hash.as_deref(), Some("h"));
        assert!(!pool.has_next());
        assert!(pool.next_account().is_none());
    }

    #[test]
    fn malformed_descriptor_gets_empty_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "broken.json", "{not json");

        let mut pool = AccountPool::discover(tmp.path(), &tmp.path().join("dead"));
        let acc = pool.next_account().unwrap();
        assert!(acc.meta_app_id.is_none());
        assert_eq!(acc.session_path, tmp.path().join("broken.session"));
    }

    #[test]
    fn missing_dir_is_an_empty_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = AccountPool::discover(&tmp.path().join("nope"), &tmp.path().join("dead"));
        assert!(pool.is_empty());
        assert!(!pool.has_next());
    }

    #[test]
    fn session_path_resolution_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let desc = dir.join("acc.json");

        assert_eq!(resolve_session_path(dir, &desc, None), dir.join("acc.session"));

        write(dir, "acc_telethon.session", "");
        assert_eq!(
            resolve_session_path(dir, &desc, None),
            dir.join("acc_telethon.session")
        );

        assert_eq!(
            resolve_session_path(dir, &desc, Some("sub/other.session")),
            dir.join("other.session")
        );
        assert_eq!(
            resolve_session_path(dir, &desc, Some("/abs/x.session")),
            PathBuf::from("/abs/x.session")
        );
    }

    #[test]
    fn mark_dead_moves_files_and_records_reason() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "acc.json", "{}");
        write(dir, "acc.session", "x");
        let dead = dir.join("dead");

        let mut pool = AccountPool::discover(dir, &dead);
        let acc = pool.next_account().unwrap();
        pool.mark_dead(&acc, "auth key invalid");

        assert!(dead.join("acc.json").exists());
        assert!(dead.join("acc.session").exists());
        assert!(!dir.join("acc.session").exists());
        assert_eq!(pool.dead_letters().len(), 1);
        assert_eq!(pool.dead_letters()[0].reason, "auth key invalid");
    }

    #[test]
    fn mark_dead_without_files_still_dead_letters() {
        let tmp = tempfile::tempdir().unwrap();
        let acc = Account::new(
            tmp.path().join("ghost.session"),
            None,
            AccountMeta::default(),
        );
        let mut pool = AccountPool::from_accounts(vec![acc.clone()], &tmp.path().join("dead"));
        assert_eq!(pool.next_account(), Some(acc.clone()));
        pool.mark_dead(&acc, "connect exhausted");
        assert_eq!(pool.dead_letters().len(), 1);
        assert!(!pool.has_next());
    }
}
