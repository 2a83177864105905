use pest_derive::Parser;

/// Grammar for builder expressions, see `builder.pest`.
#[derive(Parser)]
#[grammar = "src/parse/builder.pest"]
pub struct BuilderGrammar;
