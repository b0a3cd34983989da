use logos::{Lexer, Logos};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default, Error)]
pub enum LexerError {
    #[default]
    #[error("unknown token")]
    UnknownToken,
}

/// A piece of a shell word. Adjacent fragments with no [`Fragment::Blank`]
/// between them belong to the same word.
#[derive(Debug, PartialEq, Logos)]
#[logos(error = LexerError)]
pub enum Fragment<'a> {
    #[regex(r"[ \t\n]+")]
    Blank,
    #[regex(r#"[^ \t\n'"\\]+"#)]
    Bare(&'a str),
    #[regex(r"'[^']*'", single_quoted_str_callback)]
    SingleQuoted(&'a str),
    #[regex(r#""([^"\\]|\\.|\\\n)*""#, double_quoted_str_callback)]
    DoubleQuoted(String),
    #[regex(r"\\[^\n]", escaped_char_callback)]
    Escaped(char),
    #[token("\\\n")]
    LineContinuation,

    #[regex(r"'[^']*")]
    UnterminatedSingleQuote,
    #[regex(r#""([^"\\]|\\.|\\\n)*"#)]
    UnterminatedDoubleQuote,
    #[token("\\")]
    UnterminatedEscape,
}

fn single_quoted_str_callback<'a>(lex: &mut Lexer<'a, Fragment<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[1..slice.len() - 1]
}

fn double_quoted_str_callback<'a>(lex: &mut Lexer<'a, Fragment<'a>>) -> String {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];

    let mut res = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }

        // inside double quotes only a handful of characters can be escaped,
        // any other backslash is kept as-is
        match chars.next() {
            Some('\n') => {}
            Some(c @ ('$' | '`' | '"' | '\\')) => res.push(c),
            Some(c) => {
                res.push('\\');
                res.push(c);
            }
            None => res.push('\\'),
        }
    }

    res
}

fn escaped_char_callback<'a>(lex: &mut Lexer<'a, Fragment<'a>>) -> Option<char> {
    lex.slice().chars().nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(input: &str) -> Vec<Fragment<'_>> {
        Fragment::lexer(input).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn bare_words_and_blanks() {
        assert_eq!(
            fragments("ls  -la"),
            vec![Fragment::Bare("ls"), Fragment::Blank, Fragment::Bare("-la")]
        );
    }

    #[test]
    fn single_quotes_are_literal() {
        assert_eq!(
            fragments(r"'a \n $b'"),
            vec![Fragment::SingleQuoted(r"a \n $b")]
        );
    }

    #[test]
    fn double_quotes_unescape_selectively() {
        assert_eq!(
            fragments(r#""say \"hi\" \$HOME \q""#),
            vec![Fragment::DoubleQuoted(r#"say "hi" $HOME \q"#.to_string())]
        );
    }

    #[test]
    fn escapes_outside_quotes() {
        assert_eq!(
            fragments("a\\ b\\\nc"),
            vec![
                Fragment::Bare("a"),
                Fragment::Escaped(' '),
                Fragment::Bare("b"),
                Fragment::LineContinuation,
                Fragment::Bare("c"),
            ]
        );
    }

    #[test]
    fn unterminated_forms() {
        assert_eq!(fragments("'abc"), vec![Fragment::UnterminatedSingleQuote]);
        assert_eq!(fragments("\"abc"), vec![Fragment::UnterminatedDoubleQuote]);
        assert_eq!(
            fragments("abc\\"),
            vec![Fragment::Bare("abc"), Fragment::UnterminatedEscape]
        );
    }
}
