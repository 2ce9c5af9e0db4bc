use std::fmt;
use termion::style::{Underline, Reset};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Minimal width a column is shrunk to when the table doesn't fit.
const MIN_COLUMN_WIDTH: usize = 8;

/// Print rows as a table fitted to the terminal.
///
/// When the table is too wide its last column is truncated.
pub fn print_table<H, T, R>(header: H, rows: T)
where
    H: TableRow,
    T: AsRef<[R]>,
    R: TableRow<Size = H::Size>,
{
    let mut widths = (0..H::size())
        .map(|inx| UnicodeWidthStr::width(header.column(inx)))
        .collect::<Vec<_>>();

    for row in rows.as_ref() {
        for (inx, width) in widths.iter_mut().enumerate() {
            *width = (*width).max(UnicodeWidthStr::width(row.column(inx)));
        }
    }

    // Sum of all longest widths and spaces separating them.
    let total_width = widths.iter().sum::<usize>() + widths.len().saturating_sub(1);

    let (terminal_width, _) = termion::terminal_size().unwrap_or((80, 20));
    let terminal_width = usize::from(terminal_width);

    if total_width >= terminal_width {
        if let Some(last) = widths.last_mut() {
            let overflow = total_width - terminal_width + 1;
            *last = last.saturating_sub(overflow).max(MIN_COLUMN_WIDTH);
        }
    }

    print_row(&widths, |inx| header.column(inx), true);

    for row in rows.as_ref() {
        print_row(&widths, |inx| row.column(inx), false);
    }
}

fn print_row<'a, F>(widths: &[usize], column: F, underline: bool)
where
    F: Fn(usize) -> &'a str,
{
    for (inx, width) in widths.iter().enumerate() {
        if inx > 0 {
            print!(" ");
        }
        if underline {
            print!("{}{}{}", Underline, Column(column(inx), *width), Reset);
        } else {
            print!("{}", Column(column(inx), *width));
        }
    }
    println!();
}

pub trait TableRow {
    type Size;

    fn size() -> usize;

    fn column(&self, index: usize) -> &str;
}

macro_rules! impl_table_row {
    {
        $(
            $sizeconst:literal $size:ident => $($inx:tt : $ty:ident),+
        );+
        $(;)*
    } => {
        $(
            pub struct $size;

            impl<$($ty),+> TableRow for ($($ty,)+)
            where
                $($ty: AsRef<str>),+
            {
                type Size = $size;

                fn size() -> usize { $sizeconst }

                fn column(&self, index: usize) -> &str {
                    match index {
                        $($inx => self.$inx.as_ref(),)+
                        _ => "",
                    }
                }
            }
        )+
    };
}

impl_table_row! {
    1 One   => 0: A;
    2 Two   => 0: A, 1: B;
    3 Three => 0: A, 1: B, 2: C;
}

/// A cell padded or truncated to a display width.
struct Column<'a>(&'a str, usize);

impl<'a> fmt::Display for Column<'a> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut len = 0;
        let mut end = 0;

        for (inx, chr) in self.0.char_indices() {
            let width = UnicodeWidthChar::width(chr).unwrap_or(0);
            if len + width > self.1 {
                break;
            }
            len += width;
            end = inx + chr.len_utf8();
        }

        write!(fmt, "{0}{1:2$}", &self.0[..end], "", self.1 - len)
    }
}
