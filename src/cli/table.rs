use ansi_term::Style;
use pad::{Alignment, PadStr};
use std::fmt::{Display, Error, Formatter};
use unicode_width::UnicodeWidthStr;

/// A text table with a bold header row. Every column has the alignment of its header.
pub struct Table {
    headers: Vec<(String, Alignment)>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new() -> Table {
        Table {
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(&mut self, title: &str) {
        self.headers.push((title.to_string(), Alignment::Left));
    }

    pub fn column_rtl(&mut self, title: &str) {
        self.headers.push((title.to_string(), Alignment::Right));
    }

    pub fn row(&mut self, cells: Vec<String>) {
        debug_assert_eq!(cells.len(), self.headers.len());
        self.rows.push(cells);
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, (title, _))| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|x| UnicodeWidthStr::width(x.as_str()))
                    .fold(UnicodeWidthStr::width(title.as_str()), usize::max)
            })
            .collect()
    }

    fn line(
        &self,
        f: &mut Formatter,
        cells: &[String],
        widths: &[usize],
        bold: bool,
    ) -> Result<(), Error> {
        for (i, (text, ((_, align), width))) in cells
            .iter()
            .zip(self.headers.iter().zip(widths.iter()))
            .enumerate()
        {
            if i > 0 {
                write!(f, " ")?;
            }
            let padded = text.pad_to_width_with_alignment(*width, *align);
            if bold {
                write!(f, "{}", Style::new().bold().paint(padded))?;
            } else {
                write!(f, "{}", padded)?;
            }
        }

        writeln!(f)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        if self.headers.is_empty() {
            return Ok(());
        }

        let widths = self.widths();
        let titles: Vec<String> = self.headers.iter().map(|(x, _)| x.clone()).collect();
        self.line(f, &titles, &widths, true)?;
        for row in self.rows.iter() {
            self.line(f, row, &widths, false)?;
        }

        Ok(())
    }
}
