//! OpenAPI 3.1 document for the registered resources, built with utoipa's builder types.

use crate::generator::{EndpointSet, Operation, Resource, Target};
use crate::model::FieldType;
use crate::registry::Registry;
use crate::schema::SchemaField;
use crate::service::{DEFAULT_LIMIT, MAX_LIMIT};
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItem};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{
    Array, KnownFormat, Object, ObjectBuilder, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::{
    ComponentsBuilder, ContentBuilder, InfoBuilder, OpenApi, OpenApiBuilder, PathsBuilder, Ref,
    Required, ResponseBuilder,
};

const JSON: &str = "application/json";

fn typed(t: Type, nullable: bool) -> SchemaType {
    if nullable {
        SchemaType::from_iter([t, Type::Null])
    } else {
        SchemaType::Type(t)
    }
}

fn field_schema(f: &SchemaField) -> Object {
    let fmt = |k: KnownFormat| Some(SchemaFormat::KnownFormat(k));
    let b = ObjectBuilder::new();
    let b = match &f.field_type {
        FieldType::Text { .. } => b.schema_type(typed(Type::String, f.nullable)),
        FieldType::Integer => b.schema_type(typed(Type::Integer, f.nullable)).format(fmt(KnownFormat::Int32)),
        FieldType::BigInt | FieldType::ForeignKey { .. } => {
            b.schema_type(typed(Type::Integer, f.nullable)).format(fmt(KnownFormat::Int64))
        }
        FieldType::Float => b.schema_type(typed(Type::Number, f.nullable)).format(fmt(KnownFormat::Double)),
        FieldType::Boolean => b.schema_type(typed(Type::Boolean, f.nullable)),
        FieldType::Timestamp => b.schema_type(typed(Type::String, f.nullable)).format(fmt(KnownFormat::DateTime)),
        FieldType::Date => b.schema_type(typed(Type::String, f.nullable)).format(fmt(KnownFormat::Date)),
        FieldType::Uuid => b.schema_type(typed(Type::String, f.nullable)).format(fmt(KnownFormat::Uuid)),
        FieldType::Json => b.schema_type(SchemaType::AnyValue),
    };
    let rules = &f.rules;
    let b = b
        .max_length(rules.max_length.map(|n| n as usize))
        .min_length(rules.min_length.map(|n| n as usize))
        .pattern(rules.pattern.clone())
        .enum_values(rules.allowed.clone());
    match &f.references_table {
        Some(table) => b.description(Some(format!("References {}.id", table))).build(),
        None => b.build(),
    }
}

/// Read view: every output field, all present in responses.
fn read_schema(resource: &Resource) -> Object {
    let mut b = ObjectBuilder::new()
        .schema_type(Type::Object)
        .title(Some(resource.name.clone()))
        .description(resource.def.description.clone());
    for f in resource.schema.output_fields() {
        b = b.property(f.name.clone(), field_schema(f)).required(f.name.clone());
    }
    b.build()
}

/// Write view: input fields; `required` lists the create-time required ones when `create` is set.
fn write_schema(resource: &Resource, create: bool) -> Object {
    write_schema_with(ObjectBuilder::new().schema_type(Type::Object), resource, create)
}

/// Update view plus the required `id` a bulk update item carries.
fn update_with_id_schema(resource: &Resource) -> Object {
    let id = ObjectBuilder::new()
        .schema_type(Type::Integer)
        .format(Some(SchemaFormat::KnownFormat(KnownFormat::Int64)))
        .build();
    let b = ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("id", id)
        .required("id");
    write_schema_with(b, resource, false)
}

/// Search criteria: output fields, plus `_min` / `_max` bounds on ordered ones.
fn search_schema(resource: &Resource) -> Object {
    let mut b = ObjectBuilder::new()
        .schema_type(Type::Object)
        .description(Some("Text fields match case-insensitive substrings; others match exactly".to_string()));
    for f in resource.schema.output_fields() {
        if matches!(f.field_type, FieldType::Json) {
            continue;
        }
        b = b.property(f.name.clone(), field_schema(f));
        if f.field_type.is_ordered() {
            b = b
                .property(format!("{}_min", f.name), field_schema(f))
                .property(format!("{}_max", f.name), field_schema(f));
        }
    }
    b.build()
}

fn write_schema_with(mut b: ObjectBuilder, resource: &Resource, create: bool) -> Object {
    for f in resource.schema.input_fields() {
        b = b.property(f.name.clone(), field_schema(f));
        if create && f.required_on_create {
            b = b.required(f.name.clone());
        }
    }
    b.build()
}

fn envelope(data: impl Into<utoipa::openapi::RefOr<utoipa::openapi::Schema>>, with_meta: bool) -> Object {
    let b = ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("data", data)
        .required("data");
    if with_meta {
        list_meta(b)
    } else {
        b.build()
    }
}

fn integer() -> Object {
    ObjectBuilder::new().schema_type(Type::Integer).build()
}

/// `{ "data": [...], "meta": { "count" } }` for bulk writes.
fn bulk_envelope(item: Ref) -> Object {
    ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("data", Array::new(item))
        .required("data")
        .property(
            "meta",
            ObjectBuilder::new()
                .schema_type(Type::Object)
                .property("count", integer())
                .required("count")
                .build(),
        )
        .required("meta")
        .build()
}

fn json_body(schema: impl Into<utoipa::openapi::RefOr<utoipa::openapi::Schema>>) -> utoipa::openapi::request_body::RequestBody {
    RequestBodyBuilder::new()
        .required(Some(Required::True))
        .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
        .build()
}

fn list_meta(b: ObjectBuilder) -> Object {
    b.property(
        "meta",
        ObjectBuilder::new()
            .schema_type(Type::Object)
            .property("count", integer())
            .property("total", integer())
            .property("limit", integer())
            .property("offset", integer())
            .build(),
    )
    .required("meta")
    .build()
}

fn json_response(description: &str, schema: Object) -> utoipa::openapi::Response {
    ResponseBuilder::new()
        .description(description)
        .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
        .build()
}

fn error_response(description: &str) -> utoipa::openapi::Response {
    ResponseBuilder::new()
        .description(description)
        .content(
            JSON,
            ContentBuilder::new()
                .schema(Some(Ref::from_schema_name("ErrorBody")))
                .build(),
        )
        .build()
}

fn error_schema() -> Object {
    ObjectBuilder::new()
        .schema_type(Type::Object)
        .property(
            "error",
            ObjectBuilder::new()
                .schema_type(Type::Object)
                .property("code", ObjectBuilder::new().schema_type(Type::String).build())
                .property("message", ObjectBuilder::new().schema_type(Type::String).build())
                .property("details", ObjectBuilder::new().schema_type(SchemaType::AnyValue).build())
                .required("code")
                .required("message")
                .build(),
        )
        .required("error")
        .build()
}

fn query_param(name: &str, t: Type, description: String) -> utoipa::openapi::path::Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(ObjectBuilder::new().schema_type(t).build()))
        .build()
}

fn filter_params(mut b: OperationBuilder, r: &Resource) -> OperationBuilder {
    for f in r.schema.output_fields() {
        if matches!(f.field_type, FieldType::Json) {
            continue;
        }
        b = b.parameter(query_param(&f.name, Type::String, format!("Exact match on {}", f.name)));
        if f.field_type.is_ordered() {
            b = b
                .parameter(query_param(&format!("{}_min", f.name), Type::String, format!("{} at least", f.name)))
                .parameter(query_param(&format!("{}_max", f.name), Type::String, format!("{} at most", f.name)));
        }
    }
    b
}

fn paging_params(b: OperationBuilder) -> OperationBuilder {
    b.parameter(query_param("limit", Type::Integer, format!("Page size, default {}, at most {}", DEFAULT_LIMIT, MAX_LIMIT)))
        .parameter(query_param("offset", Type::Integer, "Rows to skip".into()))
        .parameter(query_param("order_by", Type::String, "Field name, prefix with '-' for descending".into()))
}

fn operation(set: &EndpointSet, op: Operation) -> utoipa::openapi::path::Operation {
    let r = set.resource();
    let read_ref = || Ref::from_schema_name(r.name.clone());
    let named = |suffix: &str| Ref::from_schema_name(format!("{}{}", r.name, suffix));
    let mut b = OperationBuilder::new()
        .operation_id(Some(format!("{}_{}", op.as_str(), r.path_segment)))
        .tag(r.label.clone());
    if op.by_id() {
        b = b
            .parameter(
                ParameterBuilder::new()
                    .name("id")
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .schema(Some(
                        ObjectBuilder::new()
                            .schema_type(Type::Integer)
                            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Int64)))
                            .build(),
                    ))
                    .build(),
            )
            .response("400", error_response("Malformed id"))
            .response("404", error_response("Not found"));
    }
    let writes = !matches!(op, Operation::List | Operation::Get | Operation::Count | Operation::Delete);
    if writes {
        b = b
            .response("400", error_response("Body is not valid JSON of the expected shape"))
            .response("413", error_response("Body too large"))
            .response("422", error_response("Invalid payload"));
    }
    match op {
        Operation::List => {
            b = filter_params(paging_params(b.summary(Some(format!("List {}", r.label.to_lowercase())))), r)
                .response("200", json_response("One page of records", envelope(Array::new(read_ref()), true)))
                .response("422", error_response("Invalid query"));
        }
        Operation::Count => {
            let count = ObjectBuilder::new()
                .schema_type(Type::Object)
                .property("count", integer())
                .required("count")
                .build();
            b = filter_params(b.summary(Some(format!("Count {}", r.label.to_lowercase()))), r)
                .response("200", json_response("Number of matching records", envelope(count, false)))
                .response("422", error_response("Invalid query"));
        }
        Operation::Search => {
            b = paging_params(b.summary(Some(format!("Search {}", r.label.to_lowercase()))))
                .parameter(query_param("join", Type::String, "How criteria combine: 'and' (default) or 'or'".into()))
                .request_body(Some(json_body(named("Search"))))
                .response("200", json_response("One page of matching records", envelope(Array::new(read_ref()), true)));
        }
        Operation::Get => {
            b = b
                .summary(Some(format!("Get one {}", r.name)))
                .response("200", json_response("The record", envelope(read_ref(), false)));
        }
        Operation::Create | Operation::Update => {
            let (suffix, status, summary) = match op {
                Operation::Create => ("Create", "201", format!("Create a {}", r.name)),
                _ => ("Update", "200", format!("Update a {}", r.name)),
            };
            b = b
                .summary(Some(summary))
                .request_body(Some(json_body(named(suffix))))
                .response(status, json_response("The stored record", envelope(read_ref(), false)))
                .response("409", error_response("Unique or foreign key conflict"));
        }
        Operation::Upsert => {
            let key = r.upsert_key().map(|f| f.name.clone()).unwrap_or_default();
            b = b
                .summary(Some(format!("Create a {}, or update the one with the same {}", r.name, key)))
                .request_body(Some(json_body(named("Create"))))
                .response("201", json_response("Inserted", envelope(read_ref(), false)))
                .response("200", json_response("Updated", envelope(read_ref(), false)))
                .response("409", error_response("Unique or foreign key conflict"));
        }
        Operation::CreateMany | Operation::UpdateMany | Operation::UpsertMany => {
            let (item, status, summary) = match op {
                Operation::CreateMany => ("Create", "201", "Create"),
                Operation::UpdateMany => ("UpdateWithId", "200", "Update"),
                _ => ("Create", "200", "Create or update"),
            };
            b = b
                .summary(Some(format!("{} several {} in one transaction", summary, r.label.to_lowercase())))
                .request_body(Some(json_body(Array::new(named(item)))))
                .response(status, json_response("The stored records", bulk_envelope(read_ref())))
                .response("409", error_response("Unique or foreign key conflict"));
            if op == Operation::UpdateMany {
                b = b.response("404", error_response("An id does not exist; nothing was written"));
            }
        }
        Operation::Delete => {
            b = b
                .summary(Some(format!("Delete a {}", r.name)))
                .response("204", ResponseBuilder::new().description("Deleted").build())
                .response("409", error_response("Still referenced"));
        }
    }
    b.response("503", error_response("Database unavailable")).build()
}

fn http_method(op: Operation) -> HttpMethod {
    match op {
        Operation::List | Operation::Get | Operation::Count => HttpMethod::Get,
        Operation::Create | Operation::Search | Operation::CreateMany => HttpMethod::Post,
        Operation::Update | Operation::UpdateMany => HttpMethod::Patch,
        Operation::Upsert | Operation::UpsertMany => HttpMethod::Put,
        Operation::Delete => HttpMethod::Delete,
    }
}

fn path_item(set: &EndpointSet, ops: &[Operation]) -> Option<PathItem> {
    let (first, rest) = ops.split_first()?;
    let mut item = PathItem::new(http_method(*first), operation(set, *first));
    for op in rest {
        let built = Some(operation(set, *op));
        match http_method(*op) {
            HttpMethod::Get => item.get = built,
            HttpMethod::Post => item.post = built,
            HttpMethod::Patch => item.patch = built,
            HttpMethod::Put => item.put = built,
            HttpMethod::Delete => item.delete = built,
            _ => {}
        }
    }
    Some(item)
}

const TARGETS: [Target; 5] = [Target::Collection, Target::Item, Target::Count, Target::Search, Target::Many];

/// Document every endpoint set in the registry under `title`.
pub fn document(registry: &Registry, title: &str) -> OpenApi {
    let mut paths = PathsBuilder::new();
    let mut components = ComponentsBuilder::new().schema("ErrorBody", error_schema());
    for set in registry.endpoint_sets() {
        let r = set.resource();
        let ops = set.operations();
        for target in TARGETS {
            let here: Vec<Operation> = ops.iter().copied().filter(|op| op.target() == target).collect();
            if let Some(item) = path_item(set, &here) {
                paths = paths.path(set.path(target), item);
            }
        }
        components = components
            .schema(r.name.clone(), read_schema(r))
            .schema(format!("{}Create", r.name), write_schema(r, true))
            .schema(format!("{}Update", r.name), write_schema(r, false))
            .schema(format!("{}UpdateWithId", r.name), update_with_id_schema(r))
            .schema(format!("{}Search", r.name), search_schema(r));
    }
    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(title)
                .version(env!("CARGO_PKG_VERSION"))
                .build(),
        )
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, ModelDef};
    use crate::registry::RegistryBuilder;

    #[test]
    fn documents_every_endpoint_and_schema() {
        let registry = RegistryBuilder::default()
            .definition(
                ModelDef::new("Widget")
                    .field(FieldDef::text("name"))
                    .field(FieldDef::integer("quantity"))
                    .field(FieldDef::text("secret").write_only()),
            )
            .build()
            .unwrap();
        let doc = serde_json::to_value(document(&registry, "shop")).unwrap();
        let collection = &doc["paths"]["/api/v1/widgets"];
        assert!(collection["get"].is_object());
        assert!(collection["post"].is_object());
        let item = &doc["paths"]["/api/v1/widgets/{id}"];
        assert!(item["get"].is_object());
        assert!(item["patch"].is_object());
        assert!(item["delete"].is_object());
        assert!(doc["paths"]["/api/v1/widgets/count"]["get"].is_object());
        assert!(doc["paths"]["/api/v1/widgets/search"]["post"].is_object());
        let many = &doc["paths"]["/api/v1/widgets/many"];
        assert!(many["post"].is_object());
        assert!(many["patch"].is_object());
        assert!(many["put"].is_null());
        assert!(collection["put"].is_null());

        let schemas = &doc["components"]["schemas"];
        assert!(schemas["Widget"]["properties"]["secret"].is_null());
        assert!(schemas["WidgetCreate"]["properties"]["secret"].is_object());
        assert!(schemas["WidgetCreate"]["properties"]["id"].is_null());
        let required = schemas["WidgetCreate"]["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("name")));
        assert!(!required.contains(&serde_json::json!("is_active")));
        assert_eq!(doc["info"]["title"], "shop");
        assert!(schemas["WidgetSearch"]["properties"]["quantity_min"].is_object());
        assert!(schemas["WidgetSearch"]["properties"]["secret"].is_null());
        let with_id = schemas["WidgetUpdateWithId"]["required"].as_array().unwrap();
        assert_eq!(with_id, &vec![serde_json::json!("id")]);
    }

    #[test]
    fn upsert_routes_documented_for_keyed_models() {
        let registry = RegistryBuilder::default()
            .definition(ModelDef::new("Tag").field(FieldDef::text("slug").unique()))
            .build()
            .unwrap();
        let doc = serde_json::to_value(document(&registry, "tags")).unwrap();
        let put = &doc["paths"]["/api/v1/tags"]["put"];
        assert!(put["responses"]["200"].is_object());
        assert!(put["responses"]["201"].is_object());
        assert!(doc["paths"]["/api/v1/tags/many"]["put"].is_object());
    }
}
