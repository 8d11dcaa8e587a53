//! Static report of which subgraphs contribute to each field of a query.
//!
//! This mirrors the "explain" panel of the demo client: it says where data
//! comes from, it does not plan or execute anything. Fields whose subgraph
//! differs from the one serving their parent are reached through a
//! reference resolver.

use graphql_parser::query::{
    Definition, FragmentDefinition, OperationDefinition, Selection, SelectionSet, TypeCondition,
    parse_query,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::FederatedSchema;
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRoute {
    /// Response path, e.g. `users.reviews.movie`.
    pub path: String,
    pub subgraphs: Vec<String>,
    pub via_reference: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Explanation {
    pub subgraphs: BTreeSet<String>,
    pub fields: Vec<FieldRoute>,
}

impl Explanation {
    pub fn reference_hops(&self) -> impl Iterator<Item = &FieldRoute> {
        self.fields.iter().filter(|f| f.via_reference)
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subgraphs: Vec<_> = self.subgraphs.iter().map(String::as_str).collect();
        writeln!(
            f,
            "This query touches {} subgraph(s): {}",
            subgraphs.len(),
            subgraphs.join(", ")
        )?;

        let width = self.fields.iter().map(|r| r.path.len()).max().unwrap_or(0);
        for route in &self.fields {
            write!(f, "  {:width$}  {}", route.path, route.subgraphs.join(" | "))?;
            if route.via_reference {
                write!(f, "  (entity reference)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

struct Walker<'q, 'a, 's> {
    schema: &'s FederatedSchema,
    fragments: HashMap<&'q str, &'q FragmentDefinition<'a, String>>,
    active_fragments: HashSet<&'q str>,
    explanation: Explanation,
}

impl<'q, 'a> Walker<'q, 'a, '_> {
    fn walk(
        &mut self,
        selection_set: &'q SelectionSet<'a, String>,
        parent_type: &str,
        prefix: &str,
        parent_subgraphs: Option<&[String]>,
    ) -> Result<()> {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if field.name.starts_with("__") {
                        continue;
                    }

                    let key = format!("{}.{}", parent_type, field.name);
                    let owners = self.schema.type_to_service_map.get(&key).ok_or_else(|| {
                        Error::UnknownField {
                            parent: parent_type.to_string(),
                            field: field.name.clone(),
                        }
                    })?;

                    // Stay on the parent's subgraph when it serves the field too.
                    let local: Vec<String> = match parent_subgraphs {
                        Some(parents) => owners
                            .iter()
                            .filter(|owner| parents.contains(*owner))
                            .cloned()
                            .collect(),
                        None => Vec::new(),
                    };
                    let via_reference = parent_subgraphs.is_some() && local.is_empty();
                    let subgraphs = if local.is_empty() { owners.clone() } else { local };

                    let response_key = field.alias.as_ref().unwrap_or(&field.name);
                    let path = if prefix.is_empty() {
                        response_key.clone()
                    } else {
                        format!("{prefix}.{response_key}")
                    };

                    self.explanation.subgraphs.extend(subgraphs.iter().cloned());
                    self.explanation.fields.push(FieldRoute {
                        path: path.clone(),
                        subgraphs: subgraphs.clone(),
                        via_reference,
                    });

                    if !field.selection_set.items.is_empty() {
                        if let Some(child_type) = self.schema.field_types.get(&key) {
                            let child_type = child_type.clone();
                            self.walk(&field.selection_set, &child_type, &path, Some(&subgraphs))?;
                        }
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let on = match &fragment.type_condition {
                        Some(TypeCondition::On(name)) => name.as_str(),
                        None => parent_type,
                    };
                    self.walk(&fragment.selection_set, on, prefix, parent_subgraphs)?;
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let fragment = *self
                        .fragments
                        .get(name)
                        .ok_or_else(|| Error::UnknownFragment(name.to_string()))?;
                    if !self.active_fragments.insert(name) {
                        continue;
                    }
                    let TypeCondition::On(on) = &fragment.type_condition;
                    self.walk(&fragment.selection_set, on, prefix, parent_subgraphs)?;
                    self.active_fragments.remove(name);
                }
            }
        }
        Ok(())
    }
}

pub fn explain(query: &str, schema: &FederatedSchema) -> Result<Explanation> {
    let document =
        parse_query::<String>(query).map_err(|e| Error::QueryParse(e.to_string()))?;

    let fragments = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
            Definition::Operation(_) => None,
        })
        .collect();

    let mut walker = Walker {
        schema,
        fragments,
        active_fragments: HashSet::new(),
        explanation: Explanation::default(),
    };

    for definition in &document.definitions {
        let Definition::Operation(operation) = definition else {
            continue;
        };
        let (root, selection_set) = match operation {
            OperationDefinition::SelectionSet(set) => ("Query", set),
            OperationDefinition::Query(query) => ("Query", &query.selection_set),
            OperationDefinition::Mutation(mutation) => ("Mutation", &mutation.selection_set),
            OperationDefinition::Subscription(_) => return Err(Error::UnsupportedOperation),
        };
        walker.walk(selection_set, root, "", None)?;
    }

    Ok(walker.explanation)
}
