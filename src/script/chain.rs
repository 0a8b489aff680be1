//! A deliberately small shell tokenizer for directory-change detection.
//!
//! The supported grammar is a sequence of simple commands joined by `&&` or
//! `||`. Words may be quoted with `'...'` or `"..."` and characters may be
//! escaped with `\`. Other control operators (`;`, `|`, `&`) are recognised as
//! tokens so that a `cd` clause carrying them is never mistaken for a plain
//! directory change.
//!
//! Only literal targets are tracked. A `cd` with more than one argument, a
//! `cd -`, or a target that needs shell expansion (`~`, `$VAR`, backticks) is
//! reported as [`DirectoryChange::Unsupported`] instead of being joined onto
//! the current directory as a literal path.

/// Shell control operators the tokenizer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Pipe,
    Sequence,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Operator(Operator),
}

/// Directory-change shape of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChange {
    /// No `cd` clause at the start of the line or after `&&` / `||`.
    None,
    /// The whole line is `cd <target>`.
    Only { target: String },
    /// A `cd <target>` clause mixed with other clauses or operators.
    Compound { target: String },
    /// A `cd` clause whose target cannot be resolved without a shell.
    Unsupported,
}

fn needs_expansion(target: &str) -> bool {
    target == "-" || target.starts_with('~') || target.contains(['$', '`'])
}

/// Split a command line into words and operators.
///
/// Quotes are removed from words. An unterminated quote runs to the end of
/// the input.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = text.chars().peekable();

    fn flush(tokens: &mut Vec<Token>, word: &mut String, in_word: &mut bool) {
        if *in_word {
            tokens.push(Token::Word(std::mem::take(word)));
            *in_word = false;
        }
    }

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => flush(&mut tokens, &mut word, &mut in_word),
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    word.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                word.push(escaped);
                            }
                        }
                        other => word.push(other),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    word.push(escaped);
                }
            }
            '&' => {
                flush(&mut tokens, &mut word, &mut in_word);
                if chars.next_if_eq(&'&').is_some() {
                    tokens.push(Token::Operator(Operator::And));
                } else {
                    tokens.push(Token::Operator(Operator::Background));
                }
            }
            '|' => {
                flush(&mut tokens, &mut word, &mut in_word);
                if chars.next_if_eq(&'|').is_some() {
                    tokens.push(Token::Operator(Operator::Or));
                } else {
                    tokens.push(Token::Operator(Operator::Pipe));
                }
            }
            ';' => {
                flush(&mut tokens, &mut word, &mut in_word);
                tokens.push(Token::Operator(Operator::Sequence));
            }
            other => {
                in_word = true;
                word.push(other);
            }
        }
    }
    flush(&mut tokens, &mut word, &mut in_word);

    tokens
}

/// Group tokens into clauses separated by `&&` and `||`.
pub fn split_clauses(tokens: &[Token]) -> Vec<&[Token]> {
    tokens
        .split(|t| matches!(t, Token::Operator(Operator::And | Operator::Or)))
        .collect()
}

/// Find a `cd <target>` clause and report whether it stands alone.
pub fn directory_change(command: &str) -> DirectoryChange {
    let tokens = tokenize(command);
    let clauses = split_clauses(&tokens);

    let found = clauses.iter().find_map(|clause| match clause {
        [Token::Word(program), Token::Word(target), rest @ ..] if program == "cd" => {
            Some((target, rest))
        }
        _ => None,
    });

    let Some((target, rest)) = found else {
        return DirectoryChange::None;
    };

    if matches!(rest.first(), Some(Token::Word(_))) || needs_expansion(target) {
        return DirectoryChange::Unsupported;
    }

    let target = target.clone();
    if clauses.len() == 1 && rest.is_empty() {
        DirectoryChange::Only { target }
    } else {
        DirectoryChange::Compound { target }
    }
}
