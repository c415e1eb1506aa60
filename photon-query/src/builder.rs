//! Field trees and their rendering into query text.
//!
//! A query carries two trees: input arguments ([`Field`]) and the output
//! selection ([`Selection`]). Both are rendered deterministically; sibling
//! order is the order in which fields were added.
//!
//! # Duplicate handling
//!
//! The query language has no notion of repeated keys, so every non-list
//! sibling level is deduplicated before rendering:
//! - the first occurrence of a name keeps its position
//! - later object occurrences have their children appended to it
//! - two literal occurrences of the same name are a
//!   [`DuplicateField`](crate::ErrorCode::DuplicateField) error
//! - `AND` / `OR` / `NOT`, list fields and unnamed list elements are never merged
//!
//! ```rust
//! use photon_query::{Field, Value};
//!
//! let filter = Field::object("where", vec![
//!     Field::object("email", vec![Field::value("contains", "@acme")]),
//!     Field::object("email", vec![Field::value("endsWith", ".io")]),
//! ]);
//! assert_eq!(
//!     filter.render().unwrap(),
//!     r#"where:{email:{contains:"@acme",endsWith:".io"}}"#
//! );
//! ```

use std::borrow::Cow;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Field names that combine filters and may legitimately repeat.
pub const COMBINATORS: [&str; 3] = ["AND", "OR", "NOT"];

/// Payload of a [`Field`]: a literal or nested fields, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldContent {
    /// Literal leaf.
    Value(Value),
    /// Nested object, or list elements when the field is a list.
    Fields(Vec<Field>),
}

/// One node of an input argument tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name; empty for list elements.
    pub name: SmolStr,
    /// Render the content inside `[...]`.
    pub list: bool,
    /// Wrap each list element in its own `{...}`.
    pub wrap_list: bool,
    /// Literal or nested fields.
    pub content: FieldContent,
}

impl Field {
    /// A named literal.
    pub fn value(name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            list: false,
            wrap_list: false,
            content: FieldContent::Value(value.into()),
        }
    }

    /// A named object.
    pub fn object(name: impl Into<SmolStr>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            list: false,
            wrap_list: false,
            content: FieldContent::Fields(fields),
        }
    }

    /// A named list whose elements are rendered bare inside `[...]`.
    pub fn list(name: impl Into<SmolStr>, elements: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            list: true,
            wrap_list: false,
            content: FieldContent::Fields(elements),
        }
    }

    /// An unnamed object, used as a list element.
    pub fn element(fields: Vec<Field>) -> Self {
        Self::object(SmolStr::default(), fields)
    }

    /// Wrap each list element in its own object delimiter.
    pub fn wrap_each(mut self) -> Self {
        self.wrap_list = true;
        self
    }

    /// Whether this field may be merged with a sibling of the same name.
    fn is_mergeable(&self) -> bool {
        !self.name.is_empty() && !self.list && !COMBINATORS.contains(&self.name.as_str())
    }

    /// Render this field as `name:<content>`.
    pub fn render(&self) -> QueryResult<String> {
        let mut out = String::new();
        render_field(&mut out, self, false)?;
        Ok(out)
    }
}

/// One node of the output selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Selected field or relation name.
    pub name: SmolStr,
    /// Arguments applied to a relation selection.
    pub args: Vec<Field>,
    /// Nested selection.
    pub fields: Vec<Selection>,
}

impl Selection {
    /// A scalar selection.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Several scalar selections.
    pub fn scalars<I, S>(names: I) -> Vec<Selection>
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        names.into_iter().map(Selection::new).collect()
    }

    /// A relation with a nested selection.
    pub fn relation(name: impl Into<SmolStr>, fields: Vec<Selection>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            fields,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, field: Field) -> Self {
        self.args.push(field);
        self
    }
}

/// Deduplicate one sibling level, keeping first-seen order.
pub fn dedup_fields(fields: &[Field]) -> QueryResult<Vec<Cow<'_, Field>>> {
    let mut out: Vec<Cow<'_, Field>> = Vec::with_capacity(fields.len());
    let mut seen: IndexMap<&str, usize> = IndexMap::new();

    for field in fields {
        if !field.is_mergeable() {
            out.push(Cow::Borrowed(field));
            continue;
        }
        let Some(&idx) = seen.get(field.name.as_str()) else {
            seen.insert(field.name.as_str(), out.len());
            out.push(Cow::Borrowed(field));
            continue;
        };
        match (&mut out[idx].to_mut().content, &field.content) {
            (FieldContent::Fields(existing), FieldContent::Fields(more)) => {
                existing.extend(more.iter().cloned());
            }
            _ => return Err(QueryError::duplicate_field(field.name.as_str())),
        }
    }

    Ok(out)
}

/// Deduplicate one selection level; same-name selections merge arguments and children.
pub fn dedup_selections(selections: &[Selection]) -> Vec<Cow<'_, Selection>> {
    let mut out: Vec<Cow<'_, Selection>> = Vec::with_capacity(selections.len());
    let mut seen: IndexMap<&str, usize> = IndexMap::new();

    for sel in selections {
        match seen.get(sel.name.as_str()) {
            Some(&idx) => {
                let existing = out[idx].to_mut();
                existing.args.extend(sel.args.iter().cloned());
                existing.fields.extend(sel.fields.iter().cloned());
            }
            None => {
                seen.insert(sel.name.as_str(), out.len());
                out.push(Cow::Borrowed(sel));
            }
        }
    }

    out
}

/// Render a comma separated argument list without delimiters.
pub(crate) fn render_args(out: &mut String, args: &[Field]) -> QueryResult<()> {
    render_siblings(out, args, false, false)
}

fn render_siblings(out: &mut String, fields: &[Field], list: bool, wrap_list: bool) -> QueryResult<()> {
    // list elements keep their multiplicity
    let fields: Vec<Cow<'_, Field>> = if list {
        fields.iter().map(Cow::Borrowed).collect()
    } else {
        dedup_fields(fields)?
    };

    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        render_field(out, field, wrap_list)?;
    }
    Ok(())
}

fn render_field(out: &mut String, field: &Field, wrapped: bool) -> QueryResult<()> {
    if wrapped {
        out.push('{');
    }
    if !field.name.is_empty() {
        out.push_str(&field.name);
        out.push(':');
    }
    if field.list {
        out.push('[');
    }
    match &field.content {
        FieldContent::Value(value) => {
            value.check(&field.name)?;
            value.encode_into(out);
        }
        FieldContent::Fields(children) if field.list => {
            render_siblings(out, children, true, field.wrap_list)?;
        }
        FieldContent::Fields(children) => {
            out.push('{');
            render_siblings(out, children, false, false)?;
            out.push('}');
        }
    }
    if field.list {
        out.push(']');
    }
    if wrapped {
        out.push('}');
    }
    Ok(())
}

/// Render a selection level as `{a b(args) {c}}`.
pub(crate) fn render_selection(out: &mut String, selections: &[Selection]) -> QueryResult<()> {
    out.push('{');
    for (i, sel) in dedup_selections(selections).iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&sel.name);
        if !sel.args.is_empty() {
            out.push('(');
            render_args(out, &sel.args)?;
            out.push(')');
        }
        if !sel.fields.is_empty() {
            out.push(' ');
            render_selection(out, &sel.fields)?;
        }
    }
    out.push('}');
    Ok(())
}
