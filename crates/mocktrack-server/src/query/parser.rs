//! Tokenizer and recursive-descent parser for the query subset.

use super::{
    DateFilter, DateOp, EqualityFilter, FieldValue, QueryPlan, SetFilter, SortKey,
};
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Fields that accept date comparison operators.
const DATE_FIELDS: [&str; 2] = ["created", "updated"];

#[derive(Debug, Clone, Error)]
#[error("invalid query: {0}")]
pub struct QueryError(pub String);

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => value.push(ch),
                        None => return Err(QueryError("unterminated quoted value".into())),
                    }
                }
                tokens.push(Token::Quoted(value));
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            c if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':' => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '-' || ch == '.' || ch == ':' {
                        word.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => {
                return Err(QueryError(format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn expect_word(&mut self, what: &str) -> Result<String, QueryError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(QueryError(format!("expected {what}, found {other:?}"))),
        }
    }

    /// A value: quoted string, bare word, or `currentUser()`.
    fn parse_value(&mut self) -> Result<FieldValue, QueryError> {
        match self.next() {
            Some(Token::Quoted(s)) => Ok(FieldValue::Literal(s)),
            Some(Token::Word(w)) => {
                if w.eq_ignore_ascii_case("currentUser") && self.peek() == Some(&Token::LParen) {
                    self.next();
                    match self.next() {
                        Some(Token::RParen) => Ok(FieldValue::CurrentUser),
                        other => {
                            Err(QueryError(format!("expected ')' after currentUser(, found {other:?}")))
                        }
                    }
                } else {
                    Ok(FieldValue::Literal(w))
                }
            }
            other => Err(QueryError(format!("expected value, found {other:?}"))),
        }
    }

    fn parse_clause(&mut self, plan: &mut QueryPlan) -> Result<(), QueryError> {
        let field = self.expect_word("field name")?;

        match self.next() {
            Some(Token::Eq) => {
                let value = self.parse_value()?;
                plan.equality.push(EqualityFilter { field, value });
                Ok(())
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("in") => {
                match self.next() {
                    Some(Token::LParen) => {}
                    other => return Err(QueryError(format!("expected '(' after IN, found {other:?}"))),
                }
                let mut values = vec![self.parse_value()?];
                loop {
                    match self.next() {
                        Some(Token::Comma) => values.push(self.parse_value()?),
                        Some(Token::RParen) => break,
                        other => {
                            return Err(QueryError(format!(
                                "expected ',' or ')' in IN list, found {other:?}"
                            )))
                        }
                    }
                }
                plan.sets.push(SetFilter { field, values });
                Ok(())
            }
            Some(op @ (Token::Ge | Token::Gt | Token::Le | Token::Lt)) => {
                if !DATE_FIELDS.contains(&field.as_str()) {
                    return Err(QueryError(format!(
                        "comparison operators are only supported on {DATE_FIELDS:?}, not '{field}'"
                    )));
                }
                let literal = match self.parse_value()? {
                    FieldValue::Literal(s) => s,
                    FieldValue::CurrentUser => {
                        return Err(QueryError("currentUser() is not a date literal".into()))
                    }
                };
                let value = parse_date(&literal)?;
                let op = match op {
                    Token::Ge => DateOp::Ge,
                    Token::Gt => DateOp::Gt,
                    Token::Le => DateOp::Le,
                    _ => DateOp::Lt,
                };
                plan.dates.push(DateFilter { field, op, value });
                Ok(())
            }
            other => Err(QueryError(format!(
                "expected '=', 'IN', or a comparison operator after '{field}', found {other:?}"
            ))),
        }
    }

    fn parse_order_by(&mut self, plan: &mut QueryPlan) -> Result<(), QueryError> {
        // Caller consumed ORDER; BY is next.
        let by = self.expect_word("BY")?;
        if !by.eq_ignore_ascii_case("by") {
            return Err(QueryError(format!("expected BY after ORDER, found '{by}'")));
        }

        loop {
            let field = self.expect_word("sort field")?;
            let mut descending = false;
            if let Some(Token::Word(w)) = self.peek() {
                if w.eq_ignore_ascii_case("asc") {
                    self.next();
                } else if w.eq_ignore_ascii_case("desc") {
                    descending = true;
                    self.next();
                }
            }
            plan.order.push(SortKey { field, descending });

            match self.peek() {
                Some(Token::Comma) => {
                    self.next();
                }
                None => break,
                other => return Err(QueryError(format!("unexpected token after sort key: {other:?}"))),
            }
        }
        Ok(())
    }
}

/// Parse a query string, rejecting anything outside the grammar.
pub fn parse(input: &str) -> Result<QueryPlan, QueryError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut plan = QueryPlan::default();

    if parser.peek().is_none() {
        return Ok(plan);
    }

    loop {
        if parser.peek_keyword("order") {
            parser.next();
            parser.parse_order_by(&mut plan)?;
            break;
        }

        parser.parse_clause(&mut plan)?;

        match parser.peek() {
            None => break,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("and") => {
                parser.next();
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("order") => {}
            other => {
                return Err(QueryError(format!(
                    "expected AND or ORDER BY, found {other:?}"
                )))
            }
        }
    }

    if let Some(trailing) = parser.peek() {
        return Err(QueryError(format!("trailing input: {trailing:?}")));
    }

    Ok(plan)
}

/// Lenient entry point for search: anything unparseable means "match all".
pub fn parse_lenient(input: &str) -> QueryPlan {
    parse(input).unwrap_or_default()
}

fn parse_date(literal: &str) -> Result<DateTime<Utc>, QueryError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(literal) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(literal, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| QueryError(format!("invalid date '{literal}'")))?;
        return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
    }
    Err(QueryError(format!(
        "'{literal}' is not an RFC3339 timestamp or YYYY-MM-DD date"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_empty_plan() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_documented_example() {
        let plan =
            parse(r#"project = SUP AND status IN ("To Do", "Done") ORDER BY updated DESC"#)
                .unwrap();

        assert_eq!(plan.equality.len(), 1);
        assert_eq!(plan.equality[0].field, "project");
        assert_eq!(plan.equality[0].value, FieldValue::Literal("SUP".into()));

        assert_eq!(plan.sets.len(), 1);
        assert_eq!(plan.sets[0].field, "status");
        assert_eq!(
            plan.sets[0].values,
            vec![
                FieldValue::Literal("To Do".into()),
                FieldValue::Literal("Done".into())
            ]
        );

        assert_eq!(plan.order.len(), 1);
        assert_eq!(plan.order[0].field, "updated");
        assert!(plan.order[0].descending);
    }

    #[test]
    fn test_single_quoted_values() {
        let plan = parse("summary = 'login broken'").unwrap();
        assert_eq!(
            plan.equality[0].value,
            FieldValue::Literal("login broken".into())
        );
    }

    #[test]
    fn test_current_user_placeholder() {
        let plan = parse("assignee = currentUser()").unwrap();
        assert_eq!(plan.equality[0].value, FieldValue::CurrentUser);
    }

    #[test]
    fn test_date_comparison_on_created() {
        let plan = parse("created >= 2026-01-15").unwrap();
        assert_eq!(plan.dates.len(), 1);
        assert_eq!(plan.dates[0].field, "created");
        assert_eq!(plan.dates[0].op, DateOp::Ge);
        assert_eq!(
            plan.dates[0].value,
            DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_date_comparison_rejected_on_other_fields() {
        assert!(parse("project >= 2026-01-15").is_err());
    }

    #[test]
    fn test_rfc3339_date_literal() {
        let plan = parse(r#"updated > "2026-03-01T10:30:00Z""#).unwrap();
        assert_eq!(plan.dates[0].op, DateOp::Gt);
    }

    #[test]
    fn test_multiple_sort_keys() {
        let plan = parse("ORDER BY status ASC, created DESC").unwrap();
        assert_eq!(plan.order.len(), 2);
        assert!(!plan.order[0].descending);
        assert!(plan.order[1].descending);
    }

    #[test]
    fn test_or_is_rejected() {
        assert!(parse("project = DEV OR project = SUP").is_err());
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        assert!(parse(r#"summary = "oops"#).is_err());
    }

    #[test]
    fn test_lenient_parse_falls_back_to_match_all() {
        assert!(parse_lenient("project = DEV OR nope").is_empty());
        assert!(!parse_lenient("project = DEV").is_empty());
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let plan = parse("project = DEV and status in (Done) order by created desc").unwrap();
        assert_eq!(plan.equality.len(), 1);
        assert_eq!(plan.sets.len(), 1);
        assert_eq!(plan.order.len(), 1);
    }
}
