//! Hand-written tokenizer and recursive-descent parser for the query
//! dialect: `SELECT … FROM … [JOIN …] [WHERE …] [ORDER BY …] [LIMIT n]`
//! with `UNION` chaining. Anything outside the subset is rejected.

use crate::{FederationError, DEFAULT_LIMIT, MAX_LIMIT};

/// Comparison operators allowed in predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

/// A predicate literal; numerics are auto-detected at tokenization.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

/// One `field <op> literal` clause.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: CmpOp,
    pub value: Literal,
}

/// `ORDER BY field [ASC|DESC]`.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// A parsed query.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Projection columns; `["*"]` selects everything.
    pub select: Vec<String>,
    /// Primary source table.
    pub from: String,
    /// Tables referenced through `JOIN` / `UNION`, widening the source set.
    pub extra_tables: Vec<String>,
    /// `AND`-joined predicates.
    pub predicates: Vec<Predicate>,
    pub order_by: Option<OrderBy>,
    /// Row limit, defaulted and hard-capped.
    pub limit: usize,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Text(String),
    Star,
    Comma,
    Op(CmpOp),
}

fn err(msg: impl Into<String>) -> FederationError {
    FederationError::Parse(msg.into())
}

fn tokenize(text: &str) -> Result<Vec<Token>, FederationError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            ';' => i += 1,
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'>') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Ge));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Le));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(CmpOp::Gt));
                i += 1;
            }
            '<' => {
                tokens.push(Token::Op(CmpOp::Lt));
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(err("unterminated string literal"));
                }
                tokens.push(Token::Text(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).map(char::is_ascii_digit).unwrap_or(false)) =>
            {
                let start = i;
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let raw: String = chars[start..j].iter().collect();
                let number = raw
                    .parse()
                    .map_err(|_| err(format!("bad numeric literal {raw}")))?;
                tokens.push(Token::Number(number));
                i = j;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i + 1;
                while j < chars.len()
                    && (chars[j].is_ascii_alphanumeric() || chars[j] == '_' || chars[j] == '.')
                {
                    j += 1;
                }
                tokens.push(Token::Ident(chars[start..j].iter().collect()));
                i = j;
            }
            other => return Err(err(format!("unexpected character {other:?}"))),
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

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(id)) if id.eq_ignore_ascii_case(word))
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), FederationError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(err(format!("expected {word}")))
        }
    }

    fn expect_ident(&mut self) -> Result<String, FederationError> {
        match self.next() {
            Some(Token::Ident(id)) => Ok(id),
            other => Err(err(format!("expected identifier, found {other:?}"))),
        }
    }

    /// Keywords that may not be used as plain identifiers in this dialect.
    fn reserved(word: &str) -> bool {
        const RESERVED: &[&str] = &[
            "select", "from", "where", "and", "order", "by", "limit", "join", "union", "on",
            "asc", "desc", "like", "all", "inner", "left", "right", "outer",
        ];
        RESERVED.iter().any(|r| word.eq_ignore_ascii_case(r))
    }

    fn parse_projection(&mut self) -> Result<Vec<String>, FederationError> {
        if matches!(self.peek(), Some(Token::Star)) {
            self.next();
            return Ok(vec!["*".to_string()]);
        }
        let mut columns = Vec::new();
        loop {
            let ident = self.expect_ident()?;
            if Self::reserved(&ident) {
                return Err(err(format!("unexpected keyword {ident} in projection")));
            }
            // Strip an optional `table.` prefix on projection.
            let column = ident.rsplit('.').next().unwrap_or(&ident).to_string();
            columns.push(column);
            if matches!(self.peek(), Some(Token::Comma)) {
                self.next();
            } else {
                break;
            }
        }
        Ok(columns)
    }

    fn parse_predicate(&mut self) -> Result<Predicate, FederationError> {
        let field = self.expect_ident()?;
        if Self::reserved(&field) {
            return Err(err(format!("unexpected keyword {field} in predicate")));
        }
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            Some(Token::Ident(id)) if id.eq_ignore_ascii_case("like") => CmpOp::Like,
            other => return Err(err(format!("expected comparison operator, found {other:?}"))),
        };
        let value = match self.next() {
            Some(Token::Number(n)) => Literal::Number(n),
            Some(Token::Text(s)) => Literal::Text(s),
            Some(Token::Ident(id)) if !Self::reserved(&id) => Literal::Text(id),
            other => return Err(err(format!("expected literal, found {other:?}"))),
        };
        Ok(Predicate { field, op, value })
    }

    fn parse_select(&mut self, query: &mut Query, top_level: bool) -> Result<(), FederationError> {
        self.expect_keyword("select")?;
        let select = self.parse_projection()?;
        self.expect_keyword("from")?;
        let from = self.expect_ident()?;
        if top_level {
            query.select = select;
            query.from = from;
        } else {
            // UNION branch: only the source reference widens the plan.
            query.extra_tables.push(from);
        }

        // JOINs widen the source set; no real join is computed.
        loop {
            let joined = if self.eat_keyword("join") {
                true
            } else if self.peek_keyword("inner")
                || self.peek_keyword("left")
                || self.peek_keyword("right")
                || self.peek_keyword("outer")
            {
                self.next();
                self.eat_keyword("outer");
                self.expect_keyword("join")?;
                true
            } else {
                false
            };
            if !joined {
                break;
            }
            let table = self.expect_ident()?;
            query.extra_tables.push(table);
            if self.eat_keyword("on") {
                // Skip the join condition: `a.x = b.y`.
                self.expect_ident()?;
                match self.next() {
                    Some(Token::Op(CmpOp::Eq)) => {}
                    other => {
                        return Err(err(format!("expected = in join condition, found {other:?}")))
                    }
                }
                self.expect_ident()?;
            }
        }

        if self.eat_keyword("where") {
            loop {
                let predicate = self.parse_predicate()?;
                if top_level {
                    query.predicates.push(predicate);
                }
                if !self.eat_keyword("and") {
                    break;
                }
            }
        }

        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            let field = self.expect_ident()?;
            let descending = if self.eat_keyword("desc") {
                true
            } else {
                self.eat_keyword("asc");
                false
            };
            if top_level {
                query.order_by = Some(OrderBy { field, descending });
            }
        }

        if self.eat_keyword("limit") {
            let limit = match self.next() {
                Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                other => return Err(err(format!("expected limit count, found {other:?}"))),
            };
            if top_level {
                query.limit = limit.min(MAX_LIMIT);
            }
        }
        Ok(())
    }
}

/// Parse a query string.
pub fn parse(text: &str) -> Result<Query, FederationError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(err("empty query"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let mut query = Query {
        select: Vec::new(),
        from: String::new(),
        extra_tables: Vec::new(),
        predicates: Vec::new(),
        order_by: None,
        limit: DEFAULT_LIMIT,
    };
    parser.parse_select(&mut query, true)?;
    while parser.eat_keyword("union") {
        parser.eat_keyword("all");
        parser.parse_select(&mut query, false)?;
    }
    if let Some(leftover) = parser.peek() {
        return Err(err(format!("unexpected trailing input: {leftover:?}")));
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_select() {
        let q = parse("SELECT user_id, total_spend FROM analytics WHERE total_spend > 500").unwrap();
        assert_eq!(q.select, vec!["user_id", "total_spend"]);
        assert_eq!(q.from, "analytics");
        assert_eq!(q.predicates.len(), 1);
        assert_eq!(q.predicates[0].op, CmpOp::Gt);
        assert_eq!(q.predicates[0].value, Literal::Number(500.0));
        assert_eq!(q.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_star_projection_and_case_insensitivity() {
        let q = parse("select * from Sales order by revenue desc limit 3").unwrap();
        assert_eq!(q.select, vec!["*"]);
        let order = q.order_by.unwrap();
        assert_eq!(order.field, "revenue");
        assert!(order.descending);
        assert_eq!(q.limit, 3);
    }

    #[test]
    fn test_table_prefix_stripped_on_projection() {
        let q = parse("SELECT analytics.user_id FROM analytics").unwrap();
        assert_eq!(q.select, vec!["user_id"]);
    }

    #[test]
    fn test_and_joined_predicates() {
        let q = parse(
            "SELECT * FROM analytics WHERE region = 'emea' AND total_spend >= 100 AND user_id != 7",
        )
        .unwrap();
        assert_eq!(q.predicates.len(), 3);
        assert_eq!(q.predicates[0].value, Literal::Text("emea".to_string()));
        assert_eq!(q.predicates[2].op, CmpOp::Ne);
    }

    #[test]
    fn test_like_operator() {
        let q = parse("SELECT * FROM inventory WHERE product LIKE '%widget%'").unwrap();
        assert_eq!(q.predicates[0].op, CmpOp::Like);
    }

    #[test]
    fn test_join_widens_sources() {
        let q = parse("SELECT * FROM analytics JOIN sales ON analytics.user_id = sales.user_id")
            .unwrap();
        assert_eq!(q.extra_tables, vec!["sales"]);
    }

    #[test]
    fn test_union_widens_sources() {
        let q = parse("SELECT * FROM sales UNION SELECT * FROM telemetry").unwrap();
        assert_eq!(q.from, "sales");
        assert_eq!(q.extra_tables, vec!["telemetry"]);
    }

    #[test]
    fn test_limit_hard_capped() {
        let q = parse("SELECT * FROM analytics LIMIT 999999").unwrap();
        assert_eq!(q.limit, MAX_LIMIT);
    }

    #[test]
    fn test_rejects_outside_subset() {
        assert!(parse("DROP TABLE analytics").is_err());
        assert!(parse("SELECT * FROM analytics GROUP BY region").is_err());
        assert!(parse("").is_err());
        assert!(parse("SELECT FROM analytics").is_err());
        assert!(parse("SELECT * FROM analytics WHERE total_spend >").is_err());
    }

    #[test]
    fn test_unterminated_string_rejected() {
        assert!(parse("SELECT * FROM a WHERE x = 'oops").is_err());
    }

    #[test]
    fn test_negative_number_literal() {
        let q = parse("SELECT * FROM telemetry WHERE value < -10").unwrap();
        assert_eq!(q.predicates[0].value, Literal::Number(-10.0));
    }
}
