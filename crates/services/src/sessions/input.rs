use crate::error::AnswerParseError;

/// Parse typed or recognized answer text into a whole number.
///
/// Surrounding whitespace is ignored and a leading `+` or `-` is accepted.
///
/// # Errors
///
/// Returns `AnswerParseError::Empty` for blank input and
/// `AnswerParseError::Invalid` for anything that is not an integer.
pub fn parse_answer(text: &str) -> Result<i64, AnswerParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AnswerParseError::Empty);
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| AnswerParseError::Invalid(trimmed.to_owned()))
}
