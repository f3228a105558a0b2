use std::{fs, io};
use std::io::Error;
use std::path::{Path, PathBuf};

/// Unprocessed messages in a directory, oldest name first. Processed messages are renamed and
/// no longer end in `.json`.
pub fn get_message_paths(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut paths = fs::read_dir(dir)?
        .map(|res| res.map(|e| e.path()))
        .collect::<Result<Vec<PathBuf>, io::Error>>()?;
    paths.retain(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"));
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_json_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("c.json.done"), "{}").unwrap();
        fs::create_dir(dir.path().join("d.json")).unwrap();

        let paths = get_message_paths(dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("a.json"), dir.path().join("b.json")]);
    }
}
