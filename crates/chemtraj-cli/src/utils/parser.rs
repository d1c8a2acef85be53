use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Atom selection cannot be empty.")]
    EmptySelection,

    #[error("Invalid atom index '{0}' in selection. Expected a non-negative integer.")]
    InvalidIndex(String),

    #[error("Invalid range '{0}' in selection. Expected 'start-end' with start <= end (e.g., '0-9').")]
    InvalidRange(String),
}

fn parse_index(token: &str) -> Result<usize, ParseError> {
    token
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidIndex(token.trim().to_string()))
}

/// Parses a comma-separated list of indices and inclusive ranges such as
/// `0-9,15,20-22`. Order is kept and duplicates are dropped.
pub fn parse_selection(input: &str) -> Result<Vec<usize>, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::EmptySelection);
    }

    let mut indices = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse_index(start)?, parse_index(end)?);
                if start > end {
                    return Err(ParseError::InvalidRange(part.to_string()));
                }
                indices.extend(start..=end);
            }
            None => indices.push(parse_index(part)?),
        }
    }

    let mut seen = std::collections::HashSet::new();
    indices.retain(|i| seen.insert(*i));
    Ok(indices)
}
