pub mod config;
pub mod logger;

use validator::ValidationErrors;

/// Every field error as a human-readable message, nested structs included,
/// ordered by field name.
pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages = Vec::new();
    collect_messages(errors, &mut messages);
    messages
}

fn collect_messages(errors: &ValidationErrors, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for e in errs {
                    match &e.message {
                        Some(m) => out.push(m.to_string()),
                        None => out.push(format!("{field} is invalid ({})", e.code)),
                    }
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_messages(inner, out),
            ValidationErrorsKind::List(items) => {
                for inner in items.values() {
                    collect_messages(inner, out);
                }
            }
        }
    }
}
