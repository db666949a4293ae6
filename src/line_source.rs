use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::PathBuf;

use regex::Regex;

use crate::record::RecordReader;

/// Lines of several text files, read in file order. Files are opened when reached.
pub(crate) struct LineSource {
    paths: std::vec::IntoIter<PathBuf>,
    current: Option<RecordReader<String, BufReader<File>>>,
    ignore_empty: bool,
    ignore_lines: Option<Regex>,
}

impl LineSource {
    pub(crate) fn new(paths: Vec<PathBuf>, ignore_empty: bool, ignore_lines: Option<Regex>) -> LineSource {
        LineSource {
            paths: paths.into_iter(),
            current: None,
            ignore_empty,
            ignore_lines,
        }
    }

    fn is_skipped(&self, line: &str) -> bool {
        if self.ignore_empty && line.trim().is_empty() {
            return true;
        }
        match &self.ignore_lines {
            Some(r) => r.is_match(line.trim()),
            None => false,
        }
    }

    // after a failure nothing more is read
    fn stop(&mut self) {
        self.current = None;
        self.paths = Vec::new().into_iter();
    }
}

impl Iterator for LineSource {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let path = self.paths.next()?;
                match File::open(&path) {
                    Ok(file) => self.current = Some(RecordReader::new(BufReader::new(file))),
                    Err(e) => {
                        self.stop();
                        return Some(Err(io::Error::new(e.kind(), format!("{}: {}", path.display(), e))));
                    }
                }
            }
            let next = self.current.as_mut().and_then(|reader| reader.next());
            match next {
                None => self.current = None,
                Some(Err(e)) => {
                    self.stop();
                    return Some(Err(e));
                }
                Some(Ok(line)) => {
                    if !self.is_skipped(&line) {
                        return Some(Ok(line));
                    }
                }
            }
        }
    }
}

/// Combined size in bytes of `paths`.
pub(crate) fn total_size(paths: &[PathBuf]) -> io::Result<u64> {
    let mut total = 0;
    for path in paths {
        let metadata = path.metadata()
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
        total += metadata.len();
    }
    Ok(total)
}
