/// sandql SQL engine
///
/// Architecture:
/// - Lexer: classifies every character of the input into tokens
/// - Splitter: cuts batch text into statements outside quotes
/// - Parser: builds an AST for one statement
/// - Evaluator: evaluates and type-checks expressions
/// - Executor: runs statements against one scope's catalog
/// - Highlight: renders the token stream as HTML
pub mod ast;
pub mod evaluator;
pub mod executor;
pub mod highlight;
pub mod lexer;
pub mod parser;
pub mod splitter;
pub mod token;

pub use ast::{BinaryOperator, Expr, SelectStmt, Statement};
pub use evaluator::ExprEvaluator;
pub use executor::{Execution, QueryExecutor, QueryResult};
pub use highlight::{highlight, highlight_spans, HighlightSpan};
pub use lexer::{tokenize, Lexer};
pub use parser::{parse_statement, Parser};
pub use splitter::split_statements;
pub use token::{Keyword, Token, TokenKind};
