//! The `search` subcommand.

use std::path::Path;

use libstevedore::search::SearchResultExt;
use libstevedore::{Credentials, Result};

/// Runs a search and prints the result table.
pub async fn run(
    config_path: Option<&Path>,
    term: &str,
    no_index: bool,
    min_stars: i32,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<()> {
    let service = super::load_service(config_path)?;

    let credentials = match (username, password) {
        (Some(user), Some(pass)) => Credentials::basic(user, pass),
        (Some(user), None) => Credentials::basic(user, ""),
        _ => Credentials::anonymous(),
    };

    let results = service.search(term, &credentials, no_index).await?;
    let results: Vec<SearchResultExt> = results
        .into_iter()
        .filter(|r| r.star_count >= min_stars)
        .collect();

    print_table(&results, no_index);
    Ok(())
}

fn flag(set: bool) -> &'static str {
    if set { "[OK]" } else { "" }
}

/// Prints results in aligned columns, mirroring the daemon's search output.
fn print_table(results: &[SearchResultExt], no_index: bool) {
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(results.len() + 1);

    let mut header = Vec::new();
    if !no_index {
        header.push("INDEX".to_string());
    }
    header.extend(
        ["NAME", "DESCRIPTION", "STARS", "OFFICIAL", "AUTOMATED"]
            .iter()
            .map(|s| s.to_string()),
    );
    rows.push(header);

    for result in results {
        let mut row = Vec::new();
        if !no_index {
            row.push(result.index_name.clone());
        }
        row.push(format!("{}/{}", result.registry_name, result.name));
        row.push(truncate(&result.description, 45));
        row.push(result.star_count.to_string());
        row.push(flag(result.is_official).to_string());
        row.push(flag(result.is_automated).to_string());
        rows.push(row);
    }

    let columns = rows[0].len();
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().map(|r| r[c].len()).max().unwrap_or(0))
        .collect();

    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        println!("{}", line.join("  ").trim_end());
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
