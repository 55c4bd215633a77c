//! Named snapshots of parameter values, stored as text files.
//!
//! A preset file holds one value set:
//!
//! ```text
//! ::bright
//! /synth/freq f 440.0 0.5
//! /synth/label s lead
//! ::
//! ```
//!
//! Preset maps bind integer indices to preset names (`<index>:<name>` per
//! line, `::` terminator) so presets can be recalled by number.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SceneError;
use crate::{PRESET_EXTENSION, PRESET_MAP_EXTENSION};

/// Value of one registered parameter address.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParameterValue {
    Floats(Vec<f32>),
    Str(String),
}

impl ParameterValue {
    fn type_tag(&self) -> char {
        match self {
            ParameterValue::Floats(_) => 'f',
            ParameterValue::Str(_) => 's',
        }
    }
}

/// Invoked synchronously after a preset is recalled, with its map index (if
/// any) and name.
pub type PresetCallback = Box<dyn FnMut(Option<usize>, &str) + Send>;
/// Invoked synchronously after a preset is stored.
pub type StoreCallback = Box<dyn FnMut(Option<usize>, &str) + Send>;
/// Invoked synchronously when the current preset map changes.
pub type PresetMapCallback = Box<dyn FnMut(&str) + Send>;

/// Stores and recalls value sets for registered parameter addresses.
pub struct PresetHandler {
    root: PathBuf,
    sub_directory: Option<String>,
    values: HashMap<String, ParameterValue>,
    // Registration order, kept so preset files are written deterministically.
    order: Vec<String>,
    current_map: BTreeMap<usize, String>,
    current_map_name: String,
    preset_callbacks: Vec<PresetCallback>,
    store_callbacks: Vec<StoreCallback>,
    map_callbacks: Vec<PresetMapCallback>,
}

impl PresetHandler {
    /// Presets and preset maps live under `root` (or a sub-directory of it,
    /// see [`PresetHandler::set_sub_directory`]).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sub_directory: None,
            values: HashMap::new(),
            order: Vec::new(),
            current_map: BTreeMap::new(),
            current_map_name: "default".to_owned(),
            preset_callbacks: Vec::new(),
            store_callbacks: Vec::new(),
            map_callbacks: Vec::new(),
        }
    }

    /// Register a parameter address with its initial value. Re-registering
    /// an address replaces the value but keeps its position.
    pub fn register_parameter(&mut self, address: impl Into<String>, value: ParameterValue) {
        let address = address.into();
        if !self.values.contains_key(&address) {
            self.order.push(address.clone());
        }
        self.values.insert(address, value);
    }

    /// Current value of a registered address.
    pub fn parameter(&self, address: &str) -> Option<&ParameterValue> {
        self.values.get(address)
    }

    /// Set a registered address. Unregistered addresses are ignored
    /// (logged).
    pub fn set_parameter(&mut self, address: &str, value: ParameterValue) {
        match self.values.get_mut(address) {
            Some(slot) => *slot = value,
            None => log::warn!("set of unregistered parameter ignored: {address}"),
        }
    }

    pub fn set_sub_directory(&mut self, sub_directory: impl Into<String>) {
        self.sub_directory = Some(sub_directory.into());
    }

    /// Directory presets are read from and written to.
    pub fn current_path(&self) -> PathBuf {
        match &self.sub_directory {
            Some(sub) => self.root.join(sub),
            None => self.root.clone(),
        }
    }

    fn preset_file(&self, name: &str) -> PathBuf {
        self.current_path().join(format!("{name}{PRESET_EXTENSION}"))
    }

    fn map_file(&self, map_name: &str) -> PathBuf {
        self.root.join(format!("{map_name}{PRESET_MAP_EXTENSION}"))
    }

    /// Write the current parameter values as a named preset. The preset is
    /// assigned the lowest free index in the current map, and the map file
    /// is rewritten.
    pub fn store_preset(&mut self, name: &str) -> Result<(), SceneError> {
        self.write_preset_file(name)?;

        let index = match self.current_map.iter().find(|(_, n)| n.as_str() == name) {
            Some((&index, _)) => index,
            None => {
                let index = (0..).find(|i| !self.current_map.contains_key(i)).unwrap_or(0);
                self.current_map.insert(index, name.to_owned());
                self.store_current_preset_map()?;
                index
            }
        };
        for cb in &mut self.store_callbacks {
            cb(Some(index), name);
        }
        Ok(())
    }

    /// Recall a preset by name, setting every registered address the file
    /// mentions. Addresses in the file that are not registered are skipped.
    pub fn recall_preset(&mut self, name: &str) -> Result<(), SceneError> {
        let states = self.load_preset_values(name)?;
        for (address, value) in states {
            match self.values.get_mut(&address) {
                Some(slot) => *slot = value,
                None => log::debug!("preset value for unregistered address skipped: {address}"),
            }
        }
        let index = self
            .current_map
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(&i, _)| i);
        for cb in &mut self.preset_callbacks {
            cb(index, name);
        }
        Ok(())
    }

    /// Recall by index through the current preset map.
    pub fn recall_preset_by_index(&mut self, index: usize) -> Result<(), SceneError> {
        let Some(name) = self.current_map.get(&index).cloned() else {
            log::warn!("no preset at index {index} in map `{}`", self.current_map_name);
            return Ok(());
        };
        self.recall_preset(&name)
    }

    /// Parse a preset file without applying it.
    pub fn load_preset_values(
        &self,
        name: &str,
    ) -> Result<Vec<(String, ParameterValue)>, SceneError> {
        let path = self.preset_file(name);
        let text =
            fs::read_to_string(&path).map_err(|_| SceneError::FileNotFound(path.clone()))?;
        let mut states = Vec::new();
        let mut lines = text.lines();

        // `::name` header. Tolerate files whose header name disagrees with
        // the file name.
        match lines.next() {
            Some(header) if header.starts_with("::") => {}
            _ => {
                log::warn!("preset file missing :: header: {}", path.display());
                return Ok(states);
            }
        }

        for line in lines {
            if line.starts_with("::") {
                break;
            }
            let mut tokens = line.split_whitespace();
            let (Some(address), Some(type_tag)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            let value = match type_tag {
                "f" => {
                    let floats: Result<Vec<f32>, _> = tokens.map(str::parse).collect();
                    match floats {
                        Ok(floats) => ParameterValue::Floats(floats),
                        Err(_) => {
                            log::warn!("bad float list in preset line skipped: {line}");
                            continue;
                        }
                    }
                }
                "s" => ParameterValue::Str(tokens.collect::<Vec<_>>().join(" ")),
                other => {
                    log::warn!("unknown preset value type `{other}` skipped: {line}");
                    continue;
                }
            };
            states.push((address.to_owned(), value));
        }
        Ok(states)
    }

    fn write_preset_file(&self, name: &str) -> Result<(), SceneError> {
        fs::create_dir_all(self.current_path())?;
        let mut file = fs::File::create(self.preset_file(name))?;
        writeln!(file, "::{name}")?;
        for address in &self.order {
            let value = &self.values[address];
            write!(file, "{address} {} ", value.type_tag())?;
            match value {
                ParameterValue::Floats(floats) => {
                    let mut first = true;
                    for f in floats {
                        if !first {
                            write!(file, " ")?;
                        }
                        write!(file, "{f}")?;
                        first = false;
                    }
                    writeln!(file)?;
                }
                ParameterValue::Str(s) => writeln!(file, "{s}")?,
            }
        }
        writeln!(file, "::")?;
        Ok(())
    }

    // Preset maps.

    /// Indices and names of the current preset map.
    pub fn current_map(&self) -> &BTreeMap<usize, String> {
        &self.current_map
    }

    pub fn current_map_name(&self) -> &str {
        &self.current_map_name
    }

    /// Switch to a named map, loading it from disk. A missing map file
    /// yields an empty map when `auto_create` is set, an error otherwise.
    pub fn set_current_preset_map(
        &mut self,
        map_name: &str,
        auto_create: bool,
    ) -> Result<(), SceneError> {
        let path = self.map_file(map_name);
        self.current_map = if path.exists() {
            Self::parse_preset_map(&fs::read_to_string(&path)?)
        } else if auto_create {
            BTreeMap::new()
        } else {
            return Err(SceneError::FileNotFound(path));
        };
        self.current_map_name = map_name.to_owned();
        for cb in &mut self.map_callbacks {
            cb(map_name);
        }
        Ok(())
    }

    /// Write the current map back to its file.
    pub fn store_current_preset_map(&self) -> Result<(), SceneError> {
        fs::create_dir_all(&self.root)?;
        let mut file = fs::File::create(self.map_file(&self.current_map_name))?;
        for (index, name) in &self.current_map {
            writeln!(file, "{index}:{name}")?;
        }
        writeln!(file, "::")?;
        Ok(())
    }

    /// Names of all preset maps in the root directory.
    pub fn available_preset_maps(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(&self.root) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().into_string().ok()?;
                    name.strip_suffix(PRESET_MAP_EXTENSION).map(str::to_owned)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    fn parse_preset_map(text: &str) -> BTreeMap<usize, String> {
        let mut map = BTreeMap::new();
        for line in text.lines() {
            if line.starts_with("::") {
                break;
            }
            let Some((index, name)) = line.split_once(':') else {
                continue;
            };
            match index.trim().parse::<usize>() {
                Ok(index) => {
                    map.insert(index, name.trim().to_owned());
                }
                Err(_) => log::warn!("bad preset map line skipped: {line}"),
            }
        }
        map
    }

    // Callbacks. Append-only, invoked synchronously on the calling thread.

    pub fn register_preset_callback<F: FnMut(Option<usize>, &str) + Send + 'static>(
        &mut self,
        cb: F,
    ) {
        self.preset_callbacks.push(Box::new(cb));
    }

    pub fn register_store_callback<F: FnMut(Option<usize>, &str) + Send + 'static>(
        &mut self,
        cb: F,
    ) {
        self.store_callbacks.push(Box::new(cb));
    }

    pub fn register_preset_map_callback<F: FnMut(&str) + Send + 'static>(&mut self, cb: F) {
        self.map_callbacks.push(Box::new(cb));
    }

    /// Names of all presets in the current preset directory, sorted
    /// case-insensitively.
    pub fn available_presets(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(self.current_path()) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().into_string().ok()?;
                    name.strip_suffix(PRESET_EXTENSION).map(str::to_owned)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn handler(root: &Path) -> PresetHandler {
        let mut h = PresetHandler::new(root);
        h.register_parameter("/synth/freq", ParameterValue::Floats(vec![440.0]));
        h.register_parameter("/synth/env", ParameterValue::Floats(vec![0.01, 0.2]));
        h.register_parameter("/synth/label", ParameterValue::Str("init".into()));
        h
    }

    #[test]
    fn store_then_recall_restores_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        h.store_preset("bright").unwrap();

        h.set_parameter("/synth/freq", ParameterValue::Floats(vec![220.0]));
        h.set_parameter("/synth/label", ParameterValue::Str("dull".into()));
        h.recall_preset("bright").unwrap();

        assert_eq!(
            h.parameter("/synth/freq"),
            Some(&ParameterValue::Floats(vec![440.0]))
        );
        assert_eq!(
            h.parameter("/synth/label"),
            Some(&ParameterValue::Str("init".into()))
        );
    }

    #[test]
    fn preset_file_has_header_lines_and_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        h.store_preset("shape").unwrap();

        let text = std::fs::read_to_string(dir.path().join("shape.preset")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "::shape");
        assert_eq!(lines[1], "/synth/freq f 440");
        assert_eq!(lines[2], "/synth/env f 0.01 0.2");
        assert_eq!(lines[3], "/synth/label s init");
        assert_eq!(lines[4], "::");
    }

    #[test]
    fn string_values_keep_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        h.set_parameter("/synth/label", ParameterValue::Str("two words".into()));
        h.store_preset("spacey").unwrap();

        h.set_parameter("/synth/label", ParameterValue::Str("x".into()));
        h.recall_preset("spacey").unwrap();
        assert_eq!(
            h.parameter("/synth/label"),
            Some(&ParameterValue::Str("two words".into()))
        );
    }

    #[test]
    fn unregistered_addresses_in_file_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("alien.preset"),
            "::alien\n/other/thing f 1.0\n/synth/freq f 110\n::\n",
        )
        .unwrap();
        let mut h = handler(dir.path());
        h.recall_preset("alien").unwrap();
        assert_eq!(
            h.parameter("/synth/freq"),
            Some(&ParameterValue::Floats(vec![110.0]))
        );
        assert!(h.parameter("/other/thing").is_none());
    }

    #[test]
    fn recall_missing_preset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        assert!(matches!(
            h.recall_preset("nope"),
            Err(SceneError::FileNotFound(_))
        ));
    }

    #[test]
    fn stored_presets_get_map_indices_for_recall() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        h.store_preset("a").unwrap();
        h.set_parameter("/synth/freq", ParameterValue::Floats(vec![880.0]));
        h.store_preset("b").unwrap();

        h.set_parameter("/synth/freq", ParameterValue::Floats(vec![1.0]));
        h.recall_preset_by_index(1).unwrap();
        assert_eq!(
            h.parameter("/synth/freq"),
            Some(&ParameterValue::Floats(vec![880.0]))
        );
    }

    #[test]
    fn preset_map_round_trips_through_its_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut h = handler(dir.path());
            h.store_preset("one").unwrap();
            h.store_preset("two").unwrap();
        }
        let mut h = handler(dir.path());
        h.set_current_preset_map("default", false).unwrap();
        assert_eq!(h.current_map().get(&0).map(String::as_str), Some("one"));
        assert_eq!(h.current_map().get(&1).map(String::as_str), Some("two"));
    }

    #[test]
    fn missing_map_requires_auto_create() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        assert!(h.set_current_preset_map("ghost", false).is_err());
        h.set_current_preset_map("ghost", true).unwrap();
        assert!(h.current_map().is_empty());
        assert_eq!(h.current_map_name(), "ghost");
    }

    #[test]
    fn callbacks_fire_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        let stores = Arc::new(AtomicUsize::new(0));
        let recalls = Arc::new(AtomicUsize::new(0));
        let maps = Arc::new(AtomicUsize::new(0));
        {
            let stores = Arc::clone(&stores);
            h.register_store_callback(move |_, _| {
                stores.fetch_add(1, Ordering::Relaxed);
            });
        }
        {
            let recalls = Arc::clone(&recalls);
            h.register_preset_callback(move |index, name| {
                assert_eq!(index, Some(0));
                assert_eq!(name, "a");
                recalls.fetch_add(1, Ordering::Relaxed);
            });
        }
        {
            let maps = Arc::clone(&maps);
            h.register_preset_map_callback(move |_| {
                maps.fetch_add(1, Ordering::Relaxed);
            });
        }

        h.store_preset("a").unwrap();
        h.recall_preset("a").unwrap();
        h.set_current_preset_map("other", true).unwrap();
        assert_eq!(stores.load(Ordering::Relaxed), 1);
        assert_eq!(recalls.load(Ordering::Relaxed), 1);
        assert_eq!(maps.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn sub_directory_scopes_preset_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = handler(dir.path());
        h.set_sub_directory("bank1");
        h.store_preset("deep").unwrap();
        assert!(dir.path().join("bank1/deep.preset").exists());
        assert_eq!(h.available_presets(), vec!["deep"]);
    }
}
