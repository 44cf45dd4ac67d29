#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use modkit_crud::{
    CrudConfig, CrudService, Entity, EntityDescriptor, FieldDef, FieldKind, IncludeDef,
    MemoryStorage, Storage,
};
use once_cell::sync::Lazy;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub author_id: i64,
    pub in_stock: bool,
    pub published: Option<NaiveDate>,
    pub author: Option<Box<Author>>,
}

static AUTHOR: Lazy<EntityDescriptor<Author>> = Lazy::new(|| {
    EntityDescriptor::new("Author", "authors")
        .field(
            FieldDef::new("Id", FieldKind::I64, |a: &Author| a.id.into(), |a, v| {
                a.id = v.try_into()?;
                Ok(())
            })
            .read_only(),
        )
        .field(FieldDef::new(
            "Name",
            FieldKind::String,
            |a: &Author| a.name.clone().into(),
            |a, v| {
                a.name = v.try_into()?;
                Ok(())
            },
        ))
        .field(
            FieldDef::new(
                "Email",
                FieldKind::String,
                |a: &Author| a.email.clone().into(),
                |a, v| {
                    a.email = v.try_into()?;
                    Ok(())
                },
            )
            .nullable(),
        )
        .field(
            FieldDef::new(
                "Bio",
                FieldKind::String,
                |a: &Author| a.bio.clone().into(),
                |a, v| {
                    a.bio = v.try_into()?;
                    Ok(())
                },
            )
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

static BOOK: Lazy<EntityDescriptor<Book>> = Lazy::new(|| {
    EntityDescriptor::new("Book", "books")
        .field(
            FieldDef::new("Id", FieldKind::I64, |b: &Book| b.id.into(), |b, v| {
                b.id = v.try_into()?;
                Ok(())
            })
            .read_only(),
        )
        .field(FieldDef::new(
            "Title",
            FieldKind::String,
            |b: &Book| b.title.clone().into(),
            |b, v| {
                b.title = v.try_into()?;
                Ok(())
            },
        ))
        .field(FieldDef::new("Price", FieldKind::F64, |b: &Book| b.price.into(), |b, v| {
            b.price = v.try_into()?;
            Ok(())
        }))
        .field(FieldDef::new(
            "AuthorId",
            FieldKind::I64,
            |b: &Book| b.author_id.into(),
            |b, v| {
                b.author_id = v.try_into()?;
                Ok(())
            },
        ))
        .field(FieldDef::new(
            "InStock",
            FieldKind::Bool,
            |b: &Book| b.in_stock.into(),
            |b, v| {
                b.in_stock = v.try_into()?;
                Ok(())
            },
        ))
        .field(
            FieldDef::new(
                "Published",
                FieldKind::Date,
                |b: &Book| b.published.into(),
                |b, v| {
                    b.published = v.try_into()?;
                    Ok(())
                },
            )
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
        &AUTHOR
    }
}

impl Entity for Book {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        &BOOK
    }
}

pub fn author(name: &str) -> Author {
    Author {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn book(title: &str, price: f64, author_id: i64) -> Book {
    Book {
        title: title.to_string(),
        price,
        author_id,
        in_stock: true,
        ..Default::default()
    }
}

pub fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub struct Fixture {
    pub memory: MemoryStorage,
    pub storage: Arc<dyn Storage>,
    pub authors: CrudService<Author>,
    pub books: CrudService<Book>,
}

pub fn fixture() -> Fixture {
    fixture_with(CrudConfig::default())
}

pub fn fixture_with(config: CrudConfig) -> Fixture {
    let memory = MemoryStorage::new();
    let storage: Arc<dyn Storage> = Arc::new(memory.clone());
    Fixture {
        authors: CrudService::new(storage.clone(), config.clone()).unwrap(),
        books: CrudService::new(storage.clone(), config).unwrap(),
        memory,
        storage,
    }
}

/// Creates the authors in order; ids are 1..=n.
pub async fn seed_authors(f: &Fixture, names: &[&str]) -> Vec<Author> {
    let mut out = Vec::new();
    for n in names {
        out.push(f.authors.create(author(n), &[]).await.unwrap());
    }
    out
}
