//! Built-in models served by the application.

use crud_scaffold::{FieldDef, Model, ModelDef};

pub struct Note;

impl Model for Note {
    fn definition() -> ModelDef {
        ModelDef::new("Note")
            .description("Short titled note with a 1-5 rating")
            .field(FieldDef::varchar("title", 256).unique())
            .field(FieldDef::varchar("body", 4096))
            .field(FieldDef::integer("rating").range(1.0, 5.0))
    }
}

pub struct Product;

impl Model for Product {
    fn definition() -> ModelDef {
        ModelDef::new("Product")
            .field(FieldDef::varchar("title", 256).unique())
            .field(FieldDef::varchar("description", 4096))
            .field(FieldDef::float("price").minimum(0.01))
    }
}

pub struct Widget;

impl Model for Widget {
    fn definition() -> ModelDef {
        ModelDef::new("Widget")
            .field(FieldDef::text("name"))
            .field(FieldDef::integer("quantity").minimum(0.0))
    }
}
