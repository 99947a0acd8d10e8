use crate::debugger::debugee::dwarf::unit::PlaceDescriptorOwned;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::{fs, io};

/// Renders the source window around a stop location. File contents are
/// cached per file for the lifetime of the session.
pub struct FileView {
    cached_lines: RefCell<HashMap<PathBuf, Box<[String]>>>,
}

impl FileView {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            cached_lines: RefCell::default(),
        }
    }

    /// Render the source lines around `place`, the current line marked with
    /// `->`, `bounds` lines of context before and after.
    pub fn render_source(&self, place: &PlaceDescriptorOwned, bounds: u64) -> anyhow::Result<String> {
        let line_number = if place.line_number == 0 {
            1
        } else {
            place.line_number
        };
        let line_pos = line_number - 1;
        let start = line_pos.saturating_sub(bounds);

        let mut cache = self.cached_lines.borrow_mut();
        let file_lines = match cache.get(&place.file) {
            None => {
                let file = fs::File::open(&place.file)?;
                let lines = io::BufReader::new(file)
                    .lines()
                    .map_while(Result::ok)
                    .collect::<Vec<_>>();
                cache.insert(place.file.clone(), lines.into_boxed_slice());
                cache.get(&place.file).expect("just inserted")
            }
            Some(lines) => lines,
        };

        let result = file_lines
            .iter()
            .enumerate()
            .skip(start as usize)
            .take((line_pos - start + bounds + 1) as usize)
            .fold(String::default(), |acc, (pos, line)| {
                let marker = if pos as u64 == line_pos { "->" } else { "  " };
                format!("{acc}{:5} {} {}\n", pos + 1, marker, line)
            });

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::address::GlobalAddress;
    use std::io::Write;

    fn place_for(file: PathBuf, line: u64) -> PlaceDescriptorOwned {
        PlaceDescriptorOwned {
            file_display: file.to_string_lossy().to_string(),
            file,
            address: GlobalAddress::from(0_usize),
            line_number: line,
            column_number: 0,
            pos_in_unit: 0,
            is_stmt: true,
            prolog_end: false,
        }
    }

    fn fixture_file(content: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("spray-view-test-{}", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn window_marks_current_line() {
        let path = fixture_file(
            "int weird_sum(int a,\n              int b) {\n  int c = a + 1;\n  int d = b + 2;\n  int e = c + d;\n  return e;\n}\n",
        );
        let view = FileView::new();
        let rendered = view.render_source(&place_for(path.clone(), 3), 3).unwrap();
        fs::remove_file(path).unwrap();

        let expect = "\
    1    int weird_sum(int a,
    2                  int b) {
    3 ->   int c = a + 1;
    4      int d = b + 2;
    5      int e = c + d;
    6      return e;
";
        assert_eq!(rendered, expect);
    }

    #[test]
    fn window_clips_at_file_end() {
        let path = fixture_file("a\nb\nc\nd\n");
        let view = FileView::new();
        let rendered = view.render_source(&place_for(path.clone(), 4), 3).unwrap();
        fs::remove_file(path).unwrap();

        assert_eq!(rendered, "    1    a\n    2    b\n    3    c\n    4 -> d\n");
    }
}
