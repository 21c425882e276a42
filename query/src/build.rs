//! Statement building.
//!
//! Emits one match/fetch statement per enriched query. The match clause
//! binds the root variable and compiles the filter; the fetch clause
//! recurses over the selections, keying every sub-block with its
//! [`crate::FetchKey`]. Sorting uses an anti-join idiom: a value is chosen
//! as the ordering key only if no smaller same-subject value exists, and
//! subjects missing the attribute sort last through a maximal sentinel.

use crate::{
    compile_filter, DataSelection, EnrichedQuery, LinkSelection, ResolvedSort, RoleSelection,
    Selection, VarGen,
};

/// Sentinel ordering value for subjects missing a sort attribute.
const SORT_SENTINEL: &str = "\u{10FFFF}";

/// A compiled read statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub statement: String,
}

/// Build the match/fetch statement for one enriched query.
pub fn build_query(query: &EnrichedQuery) -> CompiledQuery {
    let mut vars = VarGen::new();
    let root = vars.fresh();

    let mut lines = Vec::new();
    lines.push("match".to_string());
    lines.push(format!("{root} isa {};", query.thing));
    if let Some(filter) = &query.filter {
        compile_filter(filter, &root, &mut vars, &mut lines);
    }

    let mut sort_vars = Vec::new();
    for sort in &query.sort {
        sort_vars.push(compile_sort_key(sort, &root, &mut vars, &mut lines));
    }

    lines.push("fetch".to_string());
    lines.push(format!("{root}: {{"));
    render_block(&query.selections, &root, &mut vars, 1, &mut lines);
    lines.push("}".to_string());

    if !sort_vars.is_empty() {
        let keys: Vec<String> = query
            .sort
            .iter()
            .zip(&sort_vars)
            .map(|(sort, var)| {
                format!("{var} {}", if sort.desc { "desc" } else { "asc" })
            })
            .collect();
        lines.push(format!("sort {};", keys.join(", ")));
    }
    if let Some(offset) = query.offset {
        lines.push(format!("offset {offset};"));
    }
    if let Some(limit) = query.limit {
        lines.push(format!("limit {limit};"));
    }

    CompiledQuery {
        statement: lines.join("\n"),
    }
}

/// Bind one ordering variable for a sort key and return it.
fn compile_sort_key(
    sort: &ResolvedSort,
    subject: &str,
    vars: &mut VarGen,
    lines: &mut Vec<String>,
) -> String {
    let key = vars.fresh();
    let smaller = vars.fresh();
    let absent = vars.fresh();
    let attr = &sort.storage_path;
    lines.push(format!(
        "{{ {subject} has {attr} {key}; not {{ {subject} has {attr} {smaller}; {smaller} < {key}; }}; }} or {{ not {{ {subject} has {attr} {absent}; }}; {key} == \"{SORT_SENTINEL}\"; }};"
    ));
    key
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

/// Render the fetch entries of one block.
fn render_block(
    selections: &[Selection],
    subject: &str,
    vars: &mut VarGen,
    depth: usize,
    lines: &mut Vec<String>,
) {
    for selection in selections {
        match selection {
            Selection::Data(data) => render_data(data, subject, depth, lines),
            Selection::Link(link) => render_link(link, subject, vars, depth, lines),
            Selection::Role(role) => render_role(role, subject, vars, depth, lines),
        }
    }
}

fn render_data(data: &DataSelection, subject: &str, depth: usize, lines: &mut Vec<String>) {
    // Virtual fields have no storage; post-hooks produce them.
    if data.is_virtual {
        return;
    }
    let key = data.fetch_key();
    lines.push(format!(
        "{}\"{key}\": {subject}.{};",
        indent(depth),
        data.storage_path
    ));
}

fn render_link(
    link: &LinkSelection,
    subject: &str,
    vars: &mut VarGen,
    depth: usize,
    lines: &mut Vec<String>,
) {
    let key = link.fetch_key();
    let pad = indent(depth);

    match &link.reach {
        Some(reach) => {
            let edge = vars.fresh();
            let child = vars.fresh();
            lines.push(format!("{pad}\"{key}\": {{"));
            lines.push(format!(
                "{pad}  match {edge} ({}: {subject}, {reach}: {child}) isa {};",
                link.plays, link.relation
            ));
            if let Some(filter) = &link.filter {
                let mut inner = Vec::new();
                compile_filter(filter, &child, vars, &mut inner);
                for line in inner {
                    lines.push(format!("{pad}  {line}"));
                }
            }
            lines.push(format!("{pad}  fetch {child}: {{"));
            render_block(&link.selections, &child, vars, depth + 2, lines);
            lines.push(format!("{pad}  }}"));
            lines.push(format!("{pad}}};"));
        }
        None => {
            // The relation instance itself is the child.
            let child = vars.fresh();
            lines.push(format!("{pad}\"{key}\": {{"));
            lines.push(format!(
                "{pad}  match {child} ({}: {subject}) isa {};",
                link.plays, link.relation
            ));
            if let Some(filter) = &link.filter {
                let mut inner = Vec::new();
                compile_filter(filter, &child, vars, &mut inner);
                for line in inner {
                    lines.push(format!("{pad}  {line}"));
                }
            }
            lines.push(format!("{pad}  fetch {child}: {{"));
            render_block(&link.selections, &child, vars, depth + 2, lines);
            lines.push(format!("{pad}  }}"));
            lines.push(format!("{pad}}};"));
        }
    }
}

fn render_role(
    role: &RoleSelection,
    subject: &str,
    vars: &mut VarGen,
    depth: usize,
    lines: &mut Vec<String>,
) {
    let key = role.fetch_key();
    let pad = indent(depth);
    let child = vars.fresh();
    lines.push(format!("{pad}\"{key}\": {{"));
    lines.push(format!("{pad}  match {subject} ({}: {child});", role.role));
    if let Some(filter) = &role.filter {
        let mut inner = Vec::new();
        compile_filter(filter, &child, vars, &mut inner);
        for line in inner {
            lines.push(format!("{pad}  {line}"));
        }
    }
    lines.push(format!("{pad}  fetch {child}: {{"));
    render_block(&role.selections, &child, vars, depth + 2, lines);
    lines.push(format!("{pad}  }}"));
    lines.push(format!("{pad}}};"));
}
