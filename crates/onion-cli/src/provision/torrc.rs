//! Maintenance of the daemon configuration file.
//!
//! Existing files are never rewritten: missing directives are appended, and
//! the daemon lets the last occurrence of a directive win.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use camino::Utf8Path;

use super::ProvisionError;

/// A single `Key value` line the daemon configuration must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Directive {
    key: &'static str,
    value: String,
}

impl Directive {
    pub(crate) fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    fn is_satisfied_by(&self, line: &str) -> bool {
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            return false;
        };
        if !key.eq_ignore_ascii_case(self.key) {
            return false;
        }
        let value = tokens.collect::<Vec<_>>().join(" ");
        value == self.value
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.key, self.value)
    }
}

/// Change made to the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrcUpdate {
    /// The file did not exist and was written.
    Created,
    /// The given number of directives were appended.
    Appended(usize),
    /// Every directive was already present.
    Unchanged,
}

impl fmt::Display for TorrcUpdate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => formatter.write_str("created"),
            Self::Appended(count) => write!(formatter, "appended {count} directive(s)"),
            Self::Unchanged => formatter.write_str("unchanged"),
        }
    }
}

/// Ensures every directive appears in the file at `path`.
pub(crate) fn ensure_torrc(
    path: &Utf8Path,
    directives: &[Directive],
) -> Result<TorrcUpdate, ProvisionError> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(error) if error.kind() == io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(ProvisionError::ReadTorrc {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let Some(content) = existing else {
        let body = render(directives);
        write_new(path, &body).map_err(|source| ProvisionError::WriteTorrc {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(TorrcUpdate::Created);
    };

    let missing = missing_directives(&content, directives);
    if missing.is_empty() {
        return Ok(TorrcUpdate::Unchanged);
    }
    let mut addition = String::new();
    if !content.is_empty() && !content.ends_with('\n') {
        addition.push('\n');
    }
    addition.push_str(&render(missing.iter().copied()));
    append(path, &addition).map_err(|source| ProvisionError::WriteTorrc {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(TorrcUpdate::Appended(missing.len()))
}

fn missing_directives<'a>(content: &str, directives: &'a [Directive]) -> Vec<&'a Directive> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    directives
        .iter()
        .filter(|directive| !lines.iter().any(|line| directive.is_satisfied_by(line)))
        .collect()
}

fn render<'a>(directives: impl IntoIterator<Item = &'a Directive>) -> String {
    directives
        .into_iter()
        .map(|directive| format!("{directive}\n"))
        .collect()
}

fn write_new(path: &Utf8Path, body: &str) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}

fn append(path: &Utf8Path, addition: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(addition.as_bytes())?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    struct Workspace {
        _dir: TempDir,
        path: Utf8PathBuf,
    }

    #[fixture]
    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("etc").join("torrc"))
            .expect("utf8 temp path");
        Workspace { _dir: dir, path }
    }

    fn directives() -> Vec<Directive> {
        vec![
            Directive::new("ControlPort", "9051"),
            Directive::new("CookieAuthentication", "1"),
        ]
    }

    #[rstest]
    fn missing_files_are_created(workspace: Workspace) {
        let update = ensure_torrc(&workspace.path, &directives()).expect("create torrc");
        assert_eq!(update, TorrcUpdate::Created);
        let content = fs::read_to_string(&workspace.path).expect("read torrc");
        assert_eq!(content, "ControlPort 9051\nCookieAuthentication 1\n");
    }

    #[rstest]
    fn only_missing_directives_are_appended(workspace: Workspace) {
        fs::create_dir_all(workspace.path.parent().expect("parent")).expect("create dir");
        fs::write(&workspace.path, "# local\ncontrolport 9051\nSocksPort 0").expect("seed torrc");

        let update = ensure_torrc(&workspace.path, &directives()).expect("patch torrc");

        assert_eq!(update, TorrcUpdate::Appended(1));
        let content = fs::read_to_string(&workspace.path).expect("read torrc");
        assert_eq!(
            content,
            "# local\ncontrolport 9051\nSocksPort 0\nCookieAuthentication 1\n"
        );
    }

    #[rstest]
    fn differing_values_are_overridden_by_appending(workspace: Workspace) {
        fs::create_dir_all(workspace.path.parent().expect("parent")).expect("create dir");
        fs::write(&workspace.path, "ControlPort 9151\nCookieAuthentication 1\n")
            .expect("seed torrc");

        let update = ensure_torrc(&workspace.path, &directives()).expect("patch torrc");

        assert_eq!(update, TorrcUpdate::Appended(1));
        let content = fs::read_to_string(&workspace.path).expect("read torrc");
        assert!(content.ends_with("ControlPort 9051\n"), "{content}");
    }

    #[rstest]
    fn complete_files_are_left_alone(workspace: Workspace) {
        ensure_torrc(&workspace.path, &directives()).expect("create torrc");
        let update = ensure_torrc(&workspace.path, &directives()).expect("recheck torrc");
        assert_eq!(update, TorrcUpdate::Unchanged);
    }

    #[rstest]
    #[case("# ControlPort 9051", false)]
    #[case("ControlPort  9051", true)]
    #[case("ControlPort 90510", false)]
    fn directive_matching(#[case] line: &str, #[case] satisfied: bool) {
        let content = format!("{line}\n");
        let wanted = [Directive::new("ControlPort", "9051")];
        assert_eq!(missing_directives(&content, &wanted).is_empty(), satisfied);
    }
}
