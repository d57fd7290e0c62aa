//! Macro storage - pretty JSON files, one for the current macro and one
//! mapping favorite names to macros

use chrono::Local;
use macro_core::{Error, ErrorCode, MacroSequence, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CURRENT_FILE: &str = "macro.json";
pub const FAVORITES_FILE: &str = "favorite_macros.json";

/// `$MACRO_RECORDER_HOME`, else `~/.macro-recorder`
pub fn default_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("MACRO_RECORDER_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| Error::new(ErrorCode::Io, "home directory not found"))?;
    Ok(home.join(".macro-recorder"))
}

pub struct MacroStorage {
    dir: PathBuf,
}

impl MacroStorage {
    pub fn new() -> Result<Self> {
        Self::with_dir(default_dir()?)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    fn favorites_path(&self) -> PathBuf {
        self.dir.join(FAVORITES_FILE)
    }

    /// Replace the current macro. Empty macros are stored too.
    pub fn save_current(&self, sequence: &MacroSequence) -> Result<()> {
        write_json(&self.current_path(), sequence)?;
        debug!(events = sequence.len(), "current macro saved");
        Ok(())
    }

    /// Whether anything was ever recorded
    pub fn has_current(&self) -> bool {
        self.current_path().is_file()
    }

    /// The current macro; empty if none was saved or the file is damaged
    pub fn load_current(&self) -> Result<MacroSequence> {
        let path = self.current_path();
        let Some(text) = read_optional(&path)? else {
            return Ok(MacroSequence::empty());
        };
        match MacroSequence::from_json(&text) {
            Ok(seq) => Ok(seq),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "current macro unreadable, treating as empty");
                quarantine(&path);
                Ok(MacroSequence::empty())
            }
        }
    }

    /// Save under `name`, replacing any favorite with the same name
    pub fn save_favorite(&self, name: &str, sequence: &MacroSequence) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_name());
        }
        let mut raw = self.load_raw_favorites()?;
        let value = serde_json::to_value(sequence).map_err(Error::malformed_event)?;
        raw.insert(name.to_string(), value);
        write_json(&self.favorites_path(), &raw)?;
        debug!(name, events = sequence.len(), "favorite saved");
        Ok(())
    }

    /// All favorites that can be read; damaged entries are skipped
    pub fn load_favorites(&self) -> Result<BTreeMap<String, MacroSequence>> {
        let mut favorites = BTreeMap::new();
        for (name, value) in self.load_raw_favorites()? {
            match MacroSequence::from_value(value) {
                Ok(seq) => {
                    favorites.insert(name, seq);
                }
                Err(e) => warn!(name, error = %e, "skipping unreadable favorite"),
            }
        }
        Ok(favorites)
    }

    pub fn load_favorite(&self, name: &str) -> Result<MacroSequence> {
        let mut raw = self.load_raw_favorites()?;
        let value = raw
            .remove(name.trim())
            .ok_or_else(|| Error::favorite_not_found(name))?;
        MacroSequence::from_value(value)
    }

    /// Returns false if there was no favorite with that name
    pub fn delete_favorite(&self, name: &str) -> Result<bool> {
        let mut raw = self.load_raw_favorites()?;
        if raw.remove(name.trim()).is_none() {
            return Ok(false);
        }
        write_json(&self.favorites_path(), &raw)?;
        debug!(name, "favorite deleted");
        Ok(true)
    }

    /// Favorites as stored, without decoding the macros. Entries other than
    /// the one being changed are written back untouched.
    fn load_raw_favorites(&self) -> Result<Map<String, Value>> {
        let path = self.favorites_path();
        let Some(text) = read_optional(&path)? else {
            return Ok(Map::new());
        };
        match serde_json::from_str::<Map<String, Value>>(&text) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "favorites file unreadable, starting empty");
                quarantine(&path);
                Ok(Map::new())
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Write through a temp file so a crash never leaves half a file behind
pub(crate) fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut w, value)
            .map_err(|e| Error::new(ErrorCode::Io, e.to_string()))?;
        writeln!(w).map_err(|e| Error::io(&tmp, e))?;
        w.flush().map_err(|e| Error::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

/// Move a damaged file aside (`name.corrupt-YYYYmmdd_HHMMSS`) so it is not overwritten
fn quarantine(path: &Path) {
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", ts));
    let target = path.with_file_name(name);
    if let Err(e) = fs::rename(path, &target) {
        warn!(path = %path.display(), error = %e, "could not move damaged file aside");
    } else {
        warn!(to = %target.display(), "damaged file kept for inspection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macro_core::{Event, KeyToken};
    use std::time::Duration;

    fn seq(n: i32) -> MacroSequence {
        (0..n)
            .map(|i| Event::Move { x: i, y: i * 2, t: Duration::from_millis(i as u64 * 10) })
            .collect()
    }

    fn storage() -> (tempfile::TempDir, MacroStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = MacroStorage::with_dir(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn current_is_empty_until_saved() {
        let (_dir, s) = storage();
        assert!(!s.has_current());
        assert!(s.load_current().unwrap().is_empty());

        s.save_current(&seq(3)).unwrap();
        assert!(s.has_current());
        assert_eq!(s.load_current().unwrap(), seq(3));

        s.save_current(&MacroSequence::empty()).unwrap();
        assert!(s.has_current());
        assert!(s.load_current().unwrap().is_empty());
    }

    #[test]
    fn favorites_save_and_delete() {
        let (_dir, s) = storage();
        assert!(s.load_favorites().unwrap().is_empty());

        s.save_favorite("demo", &seq(2)).unwrap();
        assert_eq!(s.load_favorites().unwrap().get("demo"), Some(&seq(2)));

        s.save_favorite("demo", &seq(4)).unwrap();
        assert_eq!(s.load_favorite("demo").unwrap(), seq(4));

        assert!(s.delete_favorite("demo").unwrap());
        assert!(!s.load_favorites().unwrap().contains_key("demo"));
        assert!(!s.delete_favorite("demo").unwrap());
    }

    #[test]
    fn empty_name_is_rejected() {
        let (_dir, s) = storage();
        let err = s.save_favorite("  ", &seq(1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMacroName);
    }

    #[test]
    fn missing_favorite_is_an_error() {
        let (_dir, s) = storage();
        let err = s.load_favorite("nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::FavoriteNotFound);
    }

    #[test]
    fn damaged_current_degrades_to_empty() {
        let (dir, s) = storage();
        fs::write(dir.path().join(CURRENT_FILE), r#"[{"type":"move","x":1}]"#).unwrap();
        assert!(s.load_current().unwrap().is_empty());

        let kept = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("macro.json.corrupt-"));
        assert!(kept);
    }

    #[test]
    fn damaged_favorite_does_not_hide_the_others() {
        let (dir, s) = storage();
        s.save_favorite("good", &seq(1)).unwrap();

        let path = dir.path().join(FAVORITES_FILE);
        let mut raw: Map<String, Value> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        raw.insert("bad".into(), serde_json::json!([{"type": "key_press", "t": 0.1}]));
        fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

        let favorites = s.load_favorites().unwrap();
        assert_eq!(favorites.len(), 1);
        assert!(favorites.contains_key("good"));

        // Other edits keep the damaged entry on disk
        let key = MacroSequence::new(vec![Event::KeyPress { key: KeyToken::literal('a'), t: Duration::ZERO }]);
        s.save_favorite("other", &key).unwrap();
        let raw: Map<String, Value> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.contains_key("bad"));
    }

    #[test]
    fn files_are_human_readable() {
        let (dir, s) = storage();
        s.save_current(&seq(1)).unwrap();
        let text = fs::read_to_string(dir.path().join(CURRENT_FILE)).unwrap();
        assert!(text.contains("\"type\": \"move\""));
        assert!(text.contains('\n'));
    }
}
