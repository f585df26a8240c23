//! Output handling module

use crate::error::CliResult;
use anyhow::Context;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Open the output stream: a file if given, stdout otherwise
pub fn open_output(path: Option<&Path>) -> CliResult<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_writes_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.ttl");
        {
            let mut out = open_output(Some(&path)).unwrap();
            out.write_all(b"# sent 1\n\n").unwrap();
            out.flush().unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "# sent 1\n\n");
    }

    #[test]
    fn test_unwritable_location() {
        let result = open_output(Some(Path::new("/nonexistent/dir/out.ttl")));
        assert!(result.is_err());
    }
}
