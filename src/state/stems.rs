/// Allow-list files
///
/// A `.csv` dataset is read through the `name` column of its header row;
/// anything else is one name per line, with blank lines and `#` comments
/// ignored. Every value is reduced to its stem.
use crate::error::{PreviewError, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Column holding image names in dataset CSVs
const NAME_COLUMN: &str = "name";

pub fn load_stem_list(path: &Path) -> Result<BTreeSet<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| PreviewError::io(path, e))?;

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("csv"));

    let names = if is_csv {
        names_from_csv(&text).map_err(|message| PreviewError::AllowList {
            path: path.to_path_buf(),
            message,
        })?
    } else {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    let stems: BTreeSet<String> = names.iter().filter_map(|name| stem_of(name)).collect();
    tracing::debug!(path = %path.display(), stems = stems.len(), "loaded allow-list");
    Ok(stems)
}

/// `DSC_0001.NEF` -> `DSC_0001`; paths keep only their last component
pub fn stem_of(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
}

fn names_from_csv(text: &str) -> std::result::Result<Vec<String>, String> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = lines.next().ok_or("empty CSV file")?;
    let column = split_record(header.trim_start_matches('\u{feff}'))
        .iter()
        .position(|field| field.trim() == NAME_COLUMN)
        .ok_or_else(|| format!("no '{NAME_COLUMN}' column in header"))?;

    Ok(lines
        .filter_map(|line| split_record(line).into_iter().nth(column))
        .collect())
}

/// Split one CSV record, honouring double quotes and `""` escapes
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
