//! Free-text name search. Converts the simple query syntax the admin portal
//! sends (`"quoted phrase"`, `a + b`, whitespace = OR) into a Postgres tsquery.

use crate::errors::AppError;

enum Token {
    And,
    Operand(String),
}

fn is_term_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn check_term(term: &str) -> Result<(), AppError> {
    if term.chars().all(is_term_char) && !term.starts_with('-') {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Unsupported characters in search term '{term}'"
        )))
    }
}

fn tokenize(query: &str) -> Result<Vec<Token>, AppError> {
    let mut tokens = Vec::new();
    for (i, chunk) in query.split('"').enumerate() {
        if i % 2 == 1 {
            // Inside quotes: a phrase, words must be adjacent.
            let words: Vec<&str> = chunk.split_whitespace().collect();
            if words.is_empty() {
                return Err(AppError::Validation("Empty quoted phrase".to_string()));
            }
            for w in &words {
                check_term(w)?;
            }
            tokens.push(Token::Operand(words.join(" <-> ")));
            continue;
        }
        for word in chunk.split_whitespace() {
            if word == "+" {
                tokens.push(Token::And);
            } else {
                check_term(word)?;
                tokens.push(Token::Operand(word.to_string()));
            }
        }
    }
    Ok(tokens)
}

/// Builds the tsquery text for `query`, or `None` when there is nothing to search.
///
/// `"quick brown" fox + dog` becomes `quick <-> brown | fox & dog`.
/// Malformed input (unbalanced quotes, dangling `+`, tsquery operators) is a
/// validation error so it never reaches the database.
pub fn build_ts_query(query: &str) -> Result<Option<String>, AppError> {
    if query.trim().is_empty() {
        return Ok(None);
    }
    if query.matches('"').count() % 2 != 0 {
        return Err(AppError::Validation("Unbalanced quotes in search".to_string()));
    }

    let mut out = String::new();
    let mut expect_operand = true;
    let mut pending_and = false;
    for token in tokenize(query)? {
        match token {
            Token::And => {
                if expect_operand {
                    return Err(AppError::Validation("Misplaced '+' in search".to_string()));
                }
                pending_and = true;
                expect_operand = true;
            }
            Token::Operand(term) => {
                if !out.is_empty() {
                    out.push_str(if pending_and { " & " } else { " | " });
                }
                out.push_str(&term);
                pending_and = false;
                expect_operand = false;
            }
        }
    }
    if pending_and {
        return Err(AppError::Validation("Misplaced '+' in search".to_string()));
    }

    Ok(if out.is_empty() { None } else { Some(out) })
}
