//! Structured fact sheet for the specialist path
//!
//! Entities are grouped by entity type in first-seen order. A group with two
//! or more entities also gets a side-by-side comparison table whose columns
//! are the relation types present in that group.

use switchyard_common::context::LookupEntity;
use switchyard_common::models::Citation;

/// Provenance tag used when citing lookup entities
pub const LOOKUP_SOURCE: &str = "lookup";

#[derive(Debug, Clone, PartialEq)]
pub struct FactSheet {
    pub markdown: String,
    pub citations: Vec<Citation>,
}

impl FactSheet {
    pub fn build(entities: &[LookupEntity]) -> Self {
        let mut groups: Vec<(&str, Vec<&LookupEntity>)> = Vec::new();
        for entity in entities {
            match groups.iter_mut().find(|(kind, _)| *kind == entity.entity_type) {
                Some((_, members)) => members.push(entity),
                None => groups.push((entity.entity_type.as_str(), vec![entity])),
            }
        }

        let mut markdown = String::new();
        for (kind, members) in &groups {
            if !markdown.is_empty() {
                markdown.push('\n');
            }
            markdown.push_str(&format!("## {}\n\n", heading(kind)));
            for entity in members {
                render_entity(&mut markdown, entity);
            }
            if members.len() >= 2 {
                markdown.push('\n');
                render_comparison(&mut markdown, members);
            }
        }

        let citations = entities
            .iter()
            .map(|e| Citation {
                source: LOOKUP_SOURCE.to_string(),
                reference: e.code.clone(),
                title: if e.description.is_empty() {
                    e.code.clone()
                } else {
                    format!("{}: {}", e.code, e.description)
                },
                url: None,
            })
            .collect();

        Self { markdown, citations }
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

fn heading(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Other".to_string(),
    }
}

fn render_entity(out: &mut String, entity: &LookupEntity) {
    out.push_str(&format!("- **{}**: {}\n", entity.code, entity.description));
    for reference in &entity.cross_references {
        out.push_str(&format!("  - {}: {}\n", reference.relation, reference.code));
    }
}

fn render_comparison(out: &mut String, members: &[&LookupEntity]) {
    let mut relations: Vec<&str> = Vec::new();
    for reference in members.iter().flat_map(|e| &e.cross_references) {
        if !relations.contains(&reference.relation.as_str()) {
            relations.push(reference.relation.as_str());
        }
    }

    out.push_str("| Code | Description |");
    for relation in &relations {
        out.push_str(&format!(" {} |", cell(relation)));
    }
    out.push_str("\n|---|---|");
    out.push_str(&"---|".repeat(relations.len()));
    out.push('\n');

    for entity in members {
        out.push_str(&format!("| {} | {} |", cell(&entity.code), cell(&entity.description)));
        for relation in &relations {
            let codes: Vec<&str> = entity
                .cross_references
                .iter()
                .filter(|r| r.relation == *relation)
                .map(|r| r.code.as_str())
                .collect();
            let value = if codes.is_empty() {
                "-".to_string()
            } else {
                cell(&codes.join(", "))
            };
            out.push_str(&format!(" {} |", value));
        }
        out.push('\n');
    }
}

/// Table cell text: pipes escaped, line breaks flattened
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}
