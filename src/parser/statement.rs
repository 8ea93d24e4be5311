//! Statement parser: tokens → concrete parse tree.
//!
//! One statement is parsed per call, terminated by an optional `;`.
//! Parsing is pure: it validates the universal statement surface
//! (`verb kind [target] clauses*`) and records clauses loosely; whether
//! a given (verb, kind) combination is actually executable is the
//! transformer's concern.

use crate::command::Verb;
use crate::error::SyntaxError;
use crate::ResourceKind;

use super::lexer::{lex, Kw, Token, TokenKind};

/// A node plus the byte offset of its first token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub node: T,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub key: String,
    pub value: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawProjectRef {
    This,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawClause {
    With(Vec<RawField>),
    Set(Vec<RawField>),
    Args(Vec<RawField>),
    ParamsFromConfigMap {
        name: String,
        key_prefix: Option<String>,
    },
    SecretMount {
        secret: String,
        key: String,
        mount_path: String,
    },
    For(RawProjectRef),
    DependsOn(String),
    To(String),
    UseEnv(String),
    TypeValue(String),
    EngineValue(String),
}

/// Concrete parse tree of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub verb: Spanned<Verb>,
    /// `GET THIS PROJECT` — target resolved from the session binding.
    pub this_target: bool,
    pub kind: Spanned<ResourceKind>,
    pub target: Option<Spanned<String>>,
    pub clauses: Vec<Spanned<RawClause>>,
}

/// Parse one complete statement from `text`.
pub fn parse(text: &str) -> Result<Statement, SyntaxError> {
    let tokens = lex(text)?;
    let mut cur = Cursor { tokens, pos: 0 };
    let stmt = cur.statement()?;
    cur.finish()?;
    Ok(stmt)
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kw(&self) -> Option<Kw> {
        match self.peek().kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: impl Into<String>) -> SyntaxError {
        let tok = self.peek();
        SyntaxError::new(tok.offset, expected, tok.describe())
    }

    fn expect_kw(&mut self, kw: Kw, expected: &str) -> Result<Token, SyntaxError> {
        if self.peek_kw() == Some(kw) {
            Ok(self.bump())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_name(&mut self, expected: &str) -> Result<(String, usize), SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Name(name) => {
                let tok = self.bump();
                Ok((name, tok.offset))
            }
            _ => Err(self.error(expected)),
        }
    }

    fn expect_str(&mut self, expected: &str) -> Result<String, SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.bump();
                Ok(s)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn statement(&mut self) -> Result<Statement, SyntaxError> {
        let verb = self.verb()?;

        let this_target = if self.peek_kw() == Some(Kw::This) {
            self.bump();
            true
        } else {
            false
        };

        let kind = self.resource_kind(this_target)?;

        let target = match self.peek().kind.clone() {
            TokenKind::Name(name) if !this_target => {
                let tok = self.bump();
                Some(Spanned {
                    node: name,
                    offset: tok.offset,
                })
            }
            _ => None,
        };

        let mut clauses = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Semi | TokenKind::Eof => break,
                _ => {}
            }
            clauses.push(self.clause()?);
        }

        Ok(Statement {
            verb,
            this_target,
            kind,
            target,
            clauses,
        })
    }

    fn verb(&mut self) -> Result<Spanned<Verb>, SyntaxError> {
        let verb = match self.peek_kw() {
            Some(Kw::Create) => Verb::Create,
            Some(Kw::Delete) => Verb::Delete,
            Some(Kw::Update) => Verb::Update,
            Some(Kw::Get) => Verb::Get,
            Some(Kw::List) => Verb::List,
            Some(Kw::Execute) => Verb::Execute,
            Some(Kw::Use) => Verb::Use,
            Some(Kw::Drop) => Verb::Drop,
            _ => {
                return Err(self.error(
                    "a command verb (CREATE, DELETE, UPDATE, GET, LIST, EXECUTE, USE, DROP)",
                ))
            }
        };
        let tok = self.bump();
        Ok(Spanned {
            node: verb,
            offset: tok.offset,
        })
    }

    fn resource_kind(&mut self, this_target: bool) -> Result<Spanned<ResourceKind>, SyntaxError> {
        let kind = match self.peek_kw() {
            Some(Kw::Secret) => ResourceKind::Secret,
            Some(Kw::ConfigMap) => ResourceKind::ConfigMap,
            Some(Kw::Parameter) => ResourceKind::Parameter,
            Some(Kw::Script) => ResourceKind::Script,
            Some(Kw::Project) => ResourceKind::Project,
            Some(Kw::Environment) => ResourceKind::Environment,
            _ if this_target => return Err(self.error("PROJECT after THIS")),
            _ => return Err(self.error("a resource kind")),
        };
        if this_target && kind != ResourceKind::Project {
            return Err(self.error("PROJECT after THIS"));
        }
        let tok = self.bump();
        Ok(Spanned {
            node: kind,
            offset: tok.offset,
        })
    }

    fn clause(&mut self) -> Result<Spanned<RawClause>, SyntaxError> {
        let offset = self.peek().offset;
        let clause = match self.peek_kw() {
            Some(Kw::With) => {
                self.bump();
                self.with_clause()?
            }
            Some(Kw::Set) => {
                self.bump();
                RawClause::Set(self.fields()?)
            }
            Some(Kw::Type) => {
                self.bump();
                let (value, _) = self.expect_name("a script type after TYPE")?;
                RawClause::TypeValue(value)
            }
            Some(Kw::Engine) => {
                self.bump();
                let (value, _) = self.expect_name("an engine name after ENGINE")?;
                RawClause::EngineValue(value)
            }
            Some(Kw::For) | Some(Kw::From) => {
                self.bump();
                RawClause::For(self.project_ref()?)
            }
            Some(Kw::Depends) => {
                self.bump();
                self.expect_kw(Kw::On, "ON after DEPENDS")?;
                let (name, _) = self.expect_name("an environment name after DEPENDS ON")?;
                RawClause::DependsOn(name)
            }
            Some(Kw::To) => {
                self.bump();
                let (name, _) = self.expect_name("a new name after TO")?;
                RawClause::To(name)
            }
            Some(Kw::Environment) => {
                self.bump();
                let (name, _) = self.expect_name("an environment name after ENV")?;
                RawClause::UseEnv(name)
            }
            _ => return Err(self.error("a clause keyword or end of statement")),
        };
        Ok(Spanned {
            node: clause,
            offset,
        })
    }

    fn with_clause(&mut self) -> Result<RawClause, SyntaxError> {
        match self.peek_kw() {
            Some(Kw::Args) => {
                self.bump();
                if self.peek().kind != TokenKind::LParen {
                    return Err(self.error("'(' after ARGS"));
                }
                self.bump();
                let fields = self.fields()?;
                if self.peek().kind != TokenKind::RParen {
                    return Err(self.error("')' after the argument list"));
                }
                self.bump();
                Ok(RawClause::Args(fields))
            }
            Some(Kw::ParamsFromConfigMap) => {
                self.bump();
                let (name, _) = self.expect_name("a configmap name")?;
                let key_prefix = if self.peek_kw() == Some(Kw::KeyPrefix) {
                    self.bump();
                    Some(self.expect_str("a quoted prefix after KEY_PREFIX")?)
                } else {
                    None
                };
                Ok(RawClause::ParamsFromConfigMap { name, key_prefix })
            }
            Some(Kw::Secret) => {
                self.bump();
                let (secret, _) = self.expect_name("a secret name")?;
                self.expect_kw(Kw::Key, "KEY after the secret name")?;
                let key = self.expect_str("a quoted key")?;
                self.expect_kw(Kw::As, "AS after the key")?;
                let mount_path = self.expect_str("a quoted mount path")?;
                Ok(RawClause::SecretMount {
                    secret,
                    key,
                    mount_path,
                })
            }
            _ => Ok(RawClause::With(self.fields()?)),
        }
    }

    fn project_ref(&mut self) -> Result<RawProjectRef, SyntaxError> {
        match self.peek_kw() {
            Some(Kw::This) => {
                self.bump();
                self.expect_kw(Kw::Project, "PROJECT after THIS")?;
                Ok(RawProjectRef::This)
            }
            Some(Kw::Project) => {
                self.bump();
                let (name, _) = self.expect_name("a project name after PROJECT")?;
                Ok(RawProjectRef::Named(name))
            }
            _ => Err(self.error("THIS PROJECT or PROJECT <name>")),
        }
    }

    fn fields(&mut self) -> Result<Vec<RawField>, SyntaxError> {
        let mut fields = vec![self.field()?];
        while self.peek().kind == TokenKind::Comma {
            self.bump();
            fields.push(self.field()?);
        }
        Ok(fields)
    }

    fn field(&mut self) -> Result<RawField, SyntaxError> {
        let (key, offset) = self.field_key()?;
        if self.peek().kind != TokenKind::Eq {
            return Err(self.error("'=' after field name"));
        }
        self.bump();
        let value = self.expect_str("a quoted string value")?;
        Ok(RawField { key, value, offset })
    }

    /// Field keys are names, but clause keywords double as field keys in
    /// SET lists (e.g. `SET ENGINE = "..."`).
    fn field_key(&mut self) -> Result<(String, usize), SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Name(name) => {
                let tok = self.bump();
                Ok((name.to_ascii_lowercase(), tok.offset))
            }
            TokenKind::Keyword(_) => {
                let tok = self.bump();
                Ok((tok.text.to_ascii_lowercase(), tok.offset))
            }
            _ => Err(self.error("a field name")),
        }
    }

    fn finish(&mut self) -> Result<(), SyntaxError> {
        if self.peek().kind == TokenKind::Semi {
            self.bump();
        }
        if self.peek().kind != TokenKind::Eof {
            return Err(self.error("end of statement"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_secret_with_fields() {
        let stmt = parse(r#"CREATE SECRET api-token WITH token = "abc", owner = "ops";"#).unwrap();
        assert_eq!(stmt.verb.node, Verb::Create);
        assert_eq!(stmt.kind.node, ResourceKind::Secret);
        assert_eq!(stmt.target.as_ref().unwrap().node, "api-token");
        match &stmt.clauses[0].node {
            RawClause::With(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].key, "token");
                assert_eq!(fields[1].value, "ops");
            }
            other => panic!("expected WITH clause, got {other:?}"),
        }
    }

    #[test]
    fn get_this_project() {
        let stmt = parse("GET THIS PROJECT").unwrap();
        assert!(stmt.this_target);
        assert_eq!(stmt.kind.node, ResourceKind::Project);
        assert!(stmt.target.is_none());
    }

    #[test]
    fn execute_script_with_all_clauses() {
        let stmt = parse(
            r#"EXECUTE SCRIPT etl
               WITH ARGS (date = "2026-08-25", mode = "full")
               WITH PARAMS_FROM_CONFIGMAP runtime-params KEY_PREFIX "etl_"
               WITH SECRET gcs-creds KEY "credentials.json" AS "/var/secrets/gcs.json";"#,
        )
        .unwrap();
        assert_eq!(stmt.verb.node, Verb::Execute);
        assert_eq!(stmt.clauses.len(), 3);
        assert!(matches!(stmt.clauses[0].node, RawClause::Args(ref f) if f.len() == 2));
        assert!(matches!(
            stmt.clauses[1].node,
            RawClause::ParamsFromConfigMap { ref key_prefix, .. } if key_prefix.as_deref() == Some("etl_")
        ));
        assert!(matches!(
            stmt.clauses[2].node,
            RawClause::SecretMount { ref mount_path, .. } if mount_path == "/var/secrets/gcs.json"
        ));
    }

    #[test]
    fn create_env_with_project_and_dependency() {
        let stmt = parse("CREATE ENV staging FOR PROJECT alpha DEPENDS ON dev").unwrap();
        assert_eq!(stmt.kind.node, ResourceKind::Environment);
        assert!(matches!(
            stmt.clauses[0].node,
            RawClause::For(RawProjectRef::Named(ref p)) if p == "alpha"
        ));
        assert!(matches!(
            stmt.clauses[1].node,
            RawClause::DependsOn(ref e) if e == "dev"
        ));
    }

    #[test]
    fn use_project_env() {
        let stmt = parse("USE PROJECT alpha ENV dev;").unwrap();
        assert_eq!(stmt.verb.node, Verb::Use);
        assert_eq!(stmt.kind.node, ResourceKind::Project);
        assert_eq!(stmt.target.as_ref().unwrap().node, "alpha");
        assert!(matches!(
            stmt.clauses[0].node,
            RawClause::UseEnv(ref e) if e == "dev"
        ));
    }

    #[test]
    fn update_project_rename() {
        let stmt = parse("UPDATE PROJECT alpha TO alpha-prime").unwrap();
        assert!(matches!(
            stmt.clauses[0].node,
            RawClause::To(ref n) if n == "alpha-prime"
        ));
    }

    #[test]
    fn list_allows_plural_kind() {
        let stmt = parse("LIST PROJECTS;").unwrap();
        assert_eq!(stmt.verb.node, Verb::List);
        assert_eq!(stmt.kind.node, ResourceKind::Project);
        assert!(stmt.target.is_none());
    }

    #[test]
    fn create_script_with_type_engine() {
        let stmt = parse(
            r#"CREATE SCRIPT loader TYPE python ENGINE k8s_job WITH code_from_file = "etl.py", description = "nightly load""#,
        )
        .unwrap();
        assert!(matches!(stmt.clauses[0].node, RawClause::TypeValue(ref t) if t == "python"));
        assert!(matches!(stmt.clauses[1].node, RawClause::EngineValue(ref e) if e == "k8s_job"));
    }

    #[test]
    fn missing_eq_reports_caret_position() {
        let text = r#"CREATE SECRET s WITH token "abc""#;
        let err = parse(text).unwrap_err();
        assert_eq!(err.position, text.find('"').unwrap());
        assert!(err.expected.contains("'='"));
    }

    #[test]
    fn trailing_garbage_rejected() {
        let err = parse("LIST PROJECTS; gibberish").unwrap_err();
        assert_eq!(err.expected, "end of statement");
    }

    #[test]
    fn set_clause_accepts_keyword_field_keys() {
        let stmt = parse(r#"UPDATE SCRIPT etl SET engine = "spark_operator""#).unwrap();
        match &stmt.clauses[0].node {
            RawClause::Set(fields) => assert_eq!(fields[0].key, "engine"),
            other => panic!("expected SET clause, got {other:?}"),
        }
    }
}
