//! Demo catalog served by `crudctl`: authors and their books.

use chrono::NaiveDate;
use modkit_crud::{Entity, EntityDescriptor, FieldDef, FieldKind, IncludeDef};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub author_id: i64,
    pub in_stock: bool,
    pub published: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Box<Author>>,
}

static AUTHORS: Lazy<EntityDescriptor<Author>> = Lazy::new(|| {
    EntityDescriptor::new("Author", "authors")
        .field(
            FieldDef::new("Id", FieldKind::I64, |a: &Author| a.id.into(), |a, v| {
                a.id = v.try_into()?;
                Ok(())
            })
            .read_only(),
        )
        .field(FieldDef::new("Name", FieldKind::String, |a: &Author| a.name.clone().into(), |a, v| {
            a.name = v.try_into()?;
            Ok(())
        }))
        .field(
            FieldDef::new("Email", FieldKind::String, |a: &Author| a.email.clone().into(), |a, v| {
                a.email = v.try_into()?;
                Ok(())
            })
            .nullable(),
        )
        .field(
            FieldDef::new("Bio", FieldKind::String, |a: &Author| a.bio.clone().into(), |a, v| {
                a.bio = v.try_into()?;
                Ok(())
            })
            .nullable(),
        )
        .primary_key("Id")
        .include(IncludeDef::new(
            "Books",
            || Book::descriptor().schema(),
            "Id",
            "AuthorId",
            |a: &mut Author, rows| {
                a.books = rows
                    .iter()
                    .map(|r| Book::descriptor().hydrate(r))
                    .collect::<Result<_, _>>()?;
                Ok(())
            },
        ))
});

static BOOKS: Lazy<EntityDescriptor<Book>> = Lazy::new(|| {
    EntityDescriptor::new("Book", "books")
        .field(
            FieldDef::new("Id", FieldKind::I64, |b: &Book| b.id.into(), |b, v| {
                b.id = v.try_into()?;
                Ok(())
            })
            .read_only(),
        )
        .field(FieldDef::new("Title", FieldKind::String, |b: &Book| b.title.clone().into(), |b, v| {
            b.title = v.try_into()?;
            Ok(())
        }))
        .field(FieldDef::new("Price", FieldKind::F64, |b: &Book| b.price.into(), |b, v| {
            b.price = v.try_into()?;
            Ok(())
        }))
        .field(FieldDef::new("AuthorId", FieldKind::I64, |b: &Book| b.author_id.into(), |b, v| {
            b.author_id = v.try_into()?;
            Ok(())
        }))
        .field(FieldDef::new("InStock", FieldKind::Bool, |b: &Book| b.in_stock.into(), |b, v| {
            b.in_stock = v.try_into()?;
            Ok(())
        }))
        .field(
            FieldDef::new("Published", FieldKind::Date, |b: &Book| b.published.into(), |b, v| {
                b.published = v.try_into()?;
                Ok(())
            })
            .nullable(),
        )
        .primary_key("Id")
        .foreign_key("AuthorId", "authors", "Id")
        .include(IncludeDef::new(
            "Author",
            || Author::descriptor().schema(),
            "AuthorId",
            "Id",
            |b: &mut Book, rows| {
                b.author = rows
                    .first()
                    .map(|r| Author::descriptor().hydrate(r).map(Box::new))
                    .transpose()?;
                Ok(())
            },
        ))
});

impl Entity for Author {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        &AUTHORS
    }
}

impl Entity for Book {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        &BOOKS
    }
}
