use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the language catalog is downloaded from when none is present locally.
///
/// The catalog is GitHub Linguist's `languages.yml`, which maps every language
/// name to its aliases, file extensions and interpreters.
pub const DEFAULT_LANGUAGES_URL: &str =
    "https://raw.githubusercontent.com/github-linguist/linguist/main/lib/linguist/languages.yml";

/// Default on-disk location of the language catalog.
///
/// Lives in the platform cache directory (e.g. `~/.cache/mdexec/languages.yml`),
/// falling back to the system temp directory when no home is available.
pub fn default_languages_path() -> PathBuf {
    match ProjectDirs::from("", "", "mdexec") {
        Some(dirs) => dirs.cache_dir().join("languages.yml"),
        None => std::env::temp_dir().join("mdexec-languages.yml"),
    }
}

/// One entry of `languages.yml`, as written in the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LanguageEntry {
    aliases: Vec<String>,
    extensions: Vec<String>,
    interpreters: Vec<String>,
}

/// A canonical language: its name plus the informal names that refer to it.
///
/// The canonical name is the lowercased catalog name (`"Python"` becomes
/// `"python"`), which is what capabilities are registered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageIdentity {
    pub name: String,
    pub aliases: Vec<String>,
}

/// Catalog of language identities, loaded wholesale from a `languages.yml` file.
///
/// Lookups are case-insensitive and try, in order: canonical names, aliases,
/// file extensions (without the dot), and interpreter names. An earlier kind
/// always wins over a later one, so `"r"` is the R language even though some
/// other language might use a `.r` extension.
///
/// # Example
///
/// ```ignore
/// let languages = Languages::from_yaml_str("Python:\n  extensions: [\".py\"]\n")?;
/// assert_eq!(languages.lookup("py").map(|l| l.name.as_str()), Some("python"));
/// ```
#[derive(Debug, Default)]
pub struct Languages {
    index: HashMap<String, Arc<LanguageIdentity>>,
    count: usize,
}

impl Languages {
    /// Loads the catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read language catalog: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid language catalog: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, LanguageEntry> = serde_yaml::from_str(content)?;
        Ok(Self::from_entries(entries))
    }

    fn from_entries(entries: BTreeMap<String, LanguageEntry>) -> Self {
        let identities: Vec<(Arc<LanguageIdentity>, LanguageEntry)> = entries
            .into_iter()
            .map(|(name, entry)| {
                let identity = LanguageIdentity {
                    name: name.to_lowercase(),
                    aliases: entry.aliases.iter().map(|a| a.to_lowercase()).collect(),
                };
                (Arc::new(identity), entry)
            })
            .collect();

        let mut index = HashMap::new();
        let mut insert = |key: String, identity: &Arc<LanguageIdentity>| {
            index.entry(key).or_insert_with(|| identity.clone());
        };

        for (identity, _) in &identities {
            insert(identity.name.clone(), identity);
        }
        for (identity, _) in &identities {
            for alias in &identity.aliases {
                insert(alias.clone(), identity);
            }
        }
        for (identity, entry) in &identities {
            for ext in &entry.extensions {
                insert(ext.trim_start_matches('.').to_lowercase(), identity);
            }
        }
        for (identity, entry) in &identities {
            for interpreter in &entry.interpreters {
                insert(interpreter.to_lowercase(), identity);
            }
        }

        Self {
            index,
            count: identities.len(),
        }
    }

    /// Resolves an informal language tag to its canonical identity.
    pub fn lookup(&self, tag: &str) -> Option<&LanguageIdentity> {
        self.index.get(&tag.to_lowercase()).map(Arc::as_ref)
    }

    /// Number of languages in the catalog.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Downloads the language catalog from `url` and writes it to `dest`.
///
/// The file is written to a sibling temporary file first and renamed into
/// place, so a failed download never leaves a truncated catalog behind.
pub fn pull_languages(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to download language catalog from {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!(
            "Failed to download language catalog from {}: HTTP {}",
            url,
            response.status()
        );
    }

    let body = response
        .bytes()
        .with_context(|| format!("Failed to read language catalog from {}", url))?;

    let dir = match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(&body)?;
    tmp.persist(dest)
        .with_context(|| format!("Failed to write language catalog: {}", dest.display()))?;

    Ok(())
}

/// Loads the language catalog the way a run expects it.
///
/// - `path` defaults to [`default_languages_path`].
/// - If the file is missing and `auto_pull` is set, it is downloaded first.
/// - If the file exists it must load; a broken catalog is an error.
/// - If it is still missing, `Ok(None)` is returned and resolution falls back
///   to exact capability names.
pub fn load_languages(path: Option<&Path>, auto_pull: bool) -> Result<Option<Languages>> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_languages_path);

    if !path.exists() && auto_pull {
        log::info!(
            "downloading url={} dest={}",
            DEFAULT_LANGUAGES_URL,
            path.display()
        );
        pull_languages(DEFAULT_LANGUAGES_URL, &path)?;
    }

    if !path.exists() {
        log::debug!(
            "no language catalog at {}, using exact names only",
            path.display()
        );
        return Ok(None);
    }

    log::info!("loading languages={}", path.display());
    let languages = Languages::load(&path)?;
    log::debug!("loaded {} languages", languages.len());

    Ok(Some(languages))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
Python:
  type: programming
  aliases:
  - python3
  - rusthon
  extensions:
  - ".py"
  - ".pyw"
  interpreters:
  - python
  - python3
Shell:
  type: programming
  aliases:
  - sh
  - shell-script
  - bash
  - zsh
  extensions:
  - ".sh"
  - ".bash"
  interpreters:
  - bash
  - sh
R:
  extensions:
  - ".r"
Rebol:
  extensions:
  - ".r"
  - ".reb"
JavaScript:
  aliases:
  - js
  - node
  extensions:
  - ".js"
"#;

    #[test]
    fn test_lookup_by_name_alias_and_extension() {
        let languages = Languages::from_yaml_str(CATALOG).unwrap();
        assert_eq!(languages.len(), 5);

        let name_of = |tag: &str| languages.lookup(tag).map(|l| l.name.clone());
        assert_eq!(name_of("Python").as_deref(), Some("python"));
        assert_eq!(name_of("python3").as_deref(), Some("python"));
        assert_eq!(name_of("py").as_deref(), Some("python"));
        assert_eq!(name_of("bash").as_deref(), Some("shell"));
        assert_eq!(name_of("JS").as_deref(), Some("javascript"));
        assert_eq!(name_of("cobol"), None);
    }

    #[test]
    fn test_name_beats_extension() {
        let languages = Languages::from_yaml_str(CATALOG).unwrap();
        assert_eq!(languages.lookup("r").map(|l| l.name.as_str()), Some("r"));
        assert_eq!(
            languages.lookup("reb").map(|l| l.name.as_str()),
            Some("rebol")
        );
    }

    #[test]
    fn test_identity_keeps_aliases() {
        let languages = Languages::from_yaml_str(CATALOG).unwrap();
        let python = languages.lookup("python").unwrap();
        assert_eq!(python.aliases, vec!["python3", "rusthon"]);
    }

    #[test]
    fn test_invalid_catalog_is_an_error() {
        assert!(Languages::from_yaml_str("- just\n- a list\n").is_err());
    }

    #[test]
    fn test_load_missing_catalog_without_pull() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.yml");

        let languages = load_languages(Some(&path), false).unwrap();
        assert!(languages.is_none());
    }

    #[test]
    fn test_load_broken_catalog_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.yml");
        fs::write(&path, "Python: [unclosed").unwrap();

        assert!(load_languages(Some(&path), false).is_err());
    }

    #[test]
    fn test_load_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.yml");
        fs::write(&path, CATALOG).unwrap();

        let languages = load_languages(Some(&path), false).unwrap().unwrap();
        assert!(!languages.is_empty());
        assert_eq!(
            languages.lookup("rusthon").map(|l| l.name.as_str()),
            Some("python")
        );
    }
}
