//! Markdown table rendering for the accumulated sweep results.
//!
//! The report always reflects the cumulative cache state, so cases skipped in
//! the current invocation (because a prior run measured them) still appear.

use crate::cache::BenchResult;

const HEADERS: [&str; 3] = ["Driver", "Time taken to send", "Time taken to receive"];

/// Render all results as an aligned Markdown table. The driver column is
/// left-aligned, both elapsed columns right-aligned with two decimals and a
/// seconds suffix.
pub fn render(entries: &[(String, BenchResult)]) -> String {
    let rows: Vec<[String; 3]> = entries
        .iter()
        .map(|(name, result)| {
            [
                name.clone(),
                format_secs(result.client_elapsed),
                format_secs(result.server_elapsed),
            ]
        })
        .collect();

    let mut widths = [HEADERS[0].len(), HEADERS[1].len(), HEADERS[2].len()];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(String::from), &widths);
    push_alignment_row(&mut out, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn format_secs(value: f64) -> String {
    format!("{value:.2}s")
}

fn push_row(out: &mut String, cells: &[String; 3], widths: &[usize; 3]) {
    // Column 0 is text and pads right; the elapsed columns pad left.
    out.push_str(&format!(
        "| {:<w0$} | {:>w1$} | {:>w2$} |\n",
        cells[0],
        cells[1],
        cells[2],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    ));
}

fn push_alignment_row(out: &mut String, widths: &[usize; 3]) {
    out.push_str(&format!(
        "| {} | {}: | {}: |\n",
        "-".repeat(widths[0]),
        "-".repeat(widths[1] - 1),
        "-".repeat(widths[2] - 1),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(client: f64, server: f64) -> BenchResult {
        BenchResult {
            client_elapsed: client,
            server_elapsed: server,
        }
    }

    #[test]
    fn formats_two_decimals_with_unit_suffix() {
        let table = render(&[("X".to_string(), result(1.004, 2.0))]);
        assert!(table.contains("X"));
        assert!(table.contains("1.00s"));
        assert!(table.contains("2.00s"));
    }

    #[test]
    fn numeric_columns_are_right_aligned() {
        let table = render(&[("X".to_string(), result(1.004, 2.0))]);
        let data_row = table.lines().nth(2).unwrap();
        // Padding precedes the value in a right-aligned column.
        assert!(data_row.contains("|              1.00s |"));
        assert!(data_row.ends_with("2.00s |"));
        let alignment_row = table.lines().nth(1).unwrap();
        assert!(alignment_row.contains("-: |"));
    }

    #[test]
    fn renders_rows_in_entry_order() {
        let table = render(&[
            ("No queue".to_string(), result(10.5, 11.25)),
            ("RedisMessageQueue".to_string(), result(3.0, 4.0)),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("| No queue"));
        assert!(lines[3].starts_with("| RedisMessageQueue"));
    }

    #[test]
    fn empty_results_still_render_a_header() {
        let table = render(&[]);
        assert!(table.starts_with("| Driver"));
        assert_eq!(table.lines().count(), 2);
    }
}
