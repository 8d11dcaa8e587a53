use async_trait::async_trait;
use graphql_parser::parse_schema;
use graphql_parser::schema::{Definition, Field, Type, TypeDefinition, TypeExtension};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::subgraph::Subgraph;
use crate::{FederatedSchema, ServiceConfig, ServiceMap};

#[async_trait]
pub trait SchemaRegistry {
    async fn register_service(&mut self, service: ServiceConfig) -> Result<()>;
    async fn get_schema(&self) -> Result<FederatedSchema>;
}

pub struct InMemorySchemaRegistry {
    services: Arc<RwLock<ServiceMap>>,
    federated_schema: Arc<RwLock<Option<FederatedSchema>>>,
}

impl Default for InMemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        InMemorySchemaRegistry {
            services: Arc::new(RwLock::new(BTreeMap::new())),
            federated_schema: Arc::new(RwLock::new(None)),
        }
    }

    /// Registers the plain SDL of in-process subgraphs.
    pub async fn from_subgraphs(
        subgraphs: impl IntoIterator<Item = (String, Arc<dyn Subgraph>)>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (url, subgraph) in subgraphs {
            registry
                .register_service(ServiceConfig {
                    name: subgraph.name().to_string(),
                    url,
                    schema: subgraph.sdl(),
                })
                .await?;
        }
        Ok(registry)
    }

    fn build_federated_schema(services: &ServiceMap) -> Result<FederatedSchema> {
        let mut schema = FederatedSchema {
            services: services.clone(),
            ..Default::default()
        };

        for (service_name, service_config) in services {
            let document = parse_schema::<String>(&service_config.schema).map_err(|e| {
                Error::SchemaParse {
                    subgraph: service_name.clone(),
                    message: e.to_string(),
                }
            })?;

            for definition in &document.definitions {
                match definition {
                    Definition::TypeDefinition(TypeDefinition::Object(obj)) => {
                        record_object(&mut schema, service_name, &obj.name, &obj.fields);
                    }
                    Definition::TypeExtension(TypeExtension::Object(ext)) => {
                        record_object(&mut schema, service_name, &ext.name, &ext.fields);
                    }
                    Definition::TypeDefinition(TypeDefinition::Interface(iface)) => {
                        record_object(&mut schema, service_name, &iface.name, &iface.fields);
                    }
                    Definition::TypeDefinition(TypeDefinition::InputObject(input)) => {
                        record_type(&mut schema, service_name, &input.name);
                    }
                    Definition::TypeDefinition(TypeDefinition::Enum(enum_type)) => {
                        record_type(&mut schema, service_name, &enum_type.name);
                    }
                    Definition::TypeDefinition(TypeDefinition::Scalar(scalar)) => {
                        record_type(&mut schema, service_name, &scalar.name);
                    }
                    Definition::TypeDefinition(TypeDefinition::Union(union_type)) => {
                        record_type(&mut schema, service_name, &union_type.name);
                    }
                    _ => {}
                }
            }
        }

        tracing::debug!(
            types = schema.type_to_service_map.len(),
            "built type to service map"
        );
        Ok(schema)
    }
}

fn is_federation_internal(name: &str) -> bool {
    name.starts_with('_')
}

fn record_type(schema: &mut FederatedSchema, service_name: &str, type_name: &str) {
    if is_federation_internal(type_name) {
        return;
    }
    let services = schema
        .type_to_service_map
        .entry(type_name.to_string())
        .or_default();
    if !services.iter().any(|s| s == service_name) {
        services.push(service_name.to_string());
    }
}

fn record_object(
    schema: &mut FederatedSchema,
    service_name: &str,
    type_name: &str,
    fields: &[Field<'_, String>],
) {
    if is_federation_internal(type_name) {
        return;
    }
    record_type(schema, service_name, type_name);

    for field in fields.iter().filter(|f| !is_federation_internal(&f.name)) {
        let field_key = format!("{}.{}", type_name, field.name);
        schema
            .field_types
            .entry(field_key.clone())
            .or_insert_with(|| named_type(&field.field_type).to_string());
        record_type(schema, service_name, &field_key);
    }
}

fn named_type<'a>(ty: &'a Type<'_, String>) -> &'a str {
    match ty {
        Type::NamedType(name) => name.as_str(),
        Type::ListType(inner) | Type::NonNullType(inner) => named_type(inner),
    }
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaRegistry {
    async fn register_service(&mut self, service: ServiceConfig) -> Result<()> {
        let mut services = self.services.write().await;
        services.insert(service.name.clone(), service);

        let mut federated_schema = self.federated_schema.write().await;
        *federated_schema = None;

        Ok(())
    }

    async fn get_schema(&self) -> Result<FederatedSchema> {
        let cached_schema = self.federated_schema.read().await;
        if let Some(schema) = &*cached_schema {
            return Ok(schema.clone());
        }
        drop(cached_schema);

        let services = self.services.read().await;
        let schema = Self::build_federated_schema(&services)?;

        let mut federated_schema = self.federated_schema.write().await;
        *federated_schema = Some(schema.clone());

        Ok(schema)
    }
}
