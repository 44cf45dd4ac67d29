mod common;

use common::*;
use modkit_crud::{
    CrudConfig, CrudError, FieldValue, ModelError, Query, QueryError, ValidationError,
};
use modkit_query::{parse_filter, FilterInput, SearchTerm};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

#[traced_test]
#[tokio::test]
async fn create_assigns_identity_and_logs() {
    let f = fixture();

    let a = f.authors.create(author("Ursula"), &[]).await.unwrap();
    let b = f.authors.create(author("Octavia"), &[]).await.unwrap();

    assert_eq!((a.id, b.id), (1, 2));
    assert_eq!(f.memory.rows("authors").len(), 2);
    assert!(logs_contain("Successfully created Author with id=1"));
}

#[tokio::test]
async fn create_with_field_subset_starts_from_default() {
    let f = fixture();
    let payload = Author {
        name: "Ursula".into(),
        bio: Some("Earthsea".into()),
        email: Some("u@example.com".into()),
        ..Default::default()
    };

    let created = f.authors.create(payload, &fields(&["name", "Email"])).await.unwrap();

    let stored = f.authors.get_by_id(created.id).await.unwrap();
    assert_eq!(stored.name, "Ursula");
    assert_eq!(stored.email.as_deref(), Some("u@example.com"));
    assert_eq!(stored.bio, None);
}

#[traced_test]
#[tokio::test]
async fn create_subset_skips_read_only_and_rejects_unknown_fields() {
    let f = fixture();

    let mut payload = author("Ursula");
    payload.id = 42;
    let created = f.authors.create(payload, &fields(&["Id", "Name"])).await.unwrap();
    assert_eq!((created.id, created.name.as_str()), (1, "Ursula"));
    assert!(logs_contain("skipping read-only field in subset"));

    let err = f.authors.create(author("x"), &fields(&["Nickname"])).await.unwrap_err();
    assert!(matches!(err, CrudError::Model(ModelError::UnknownField { .. })));
    assert_eq!(f.memory.rows("authors").len(), 1);
}

#[traced_test]
#[tokio::test]
async fn dangling_foreign_key_is_rejected() {
    let f = fixture();

    let err = f.books.create(book("Orphan", 9.0, 99), &[]).await.unwrap_err();

    match err {
        CrudError::Validation(ValidationError::MissingReference {
            field,
            value,
            referenced,
        }) => {
            assert_eq!(field, "AuthorId");
            assert_eq!(value, "99");
            assert_eq!(referenced, "authors");
        }
        other => panic!("expected missing reference, got {other:?}"),
    }
    assert!(f.memory.rows("books").is_empty());
    assert!(logs_contain("Create of Book failed"));
}

#[tokio::test]
async fn existing_or_empty_foreign_key_is_accepted() {
    let f = fixture();
    let a = seed_authors(&f, &["Ursula"]).await.remove(0);

    let linked = f.books.create(book("Earthsea", 12.5, a.id), &[]).await.unwrap();
    let unlinked = f.books.create(book("Anthology", 20.0, 0), &[]).await.unwrap();

    assert_eq!(linked.author_id, a.id);
    assert_eq!(unlinked.author_id, 0);
    assert_eq!(f.memory.rows("books").len(), 2);
}

#[traced_test]
#[tokio::test]
async fn update_replaces_or_merges() {
    let f = fixture();
    let mut a = seed_authors(&f, &["Ursula"]).await.remove(0);

    a.name = "Ursula K.".into();
    a.bio = Some("Earthsea".into());
    let replaced = f.authors.update(a.clone(), &[], None).await.unwrap();
    assert_eq!(replaced.bio.as_deref(), Some("Earthsea"));

    let patch = Author {
        id: a.id,
        name: "ignored".into(),
        email: Some("u@example.com".into()),
        ..Default::default()
    };
    let merged = f.authors.update(patch, &fields(&["Email"]), None).await.unwrap();
    assert_eq!(merged.name, "Ursula K.");
    assert_eq!(merged.bio.as_deref(), Some("Earthsea"));
    assert_eq!(merged.email.as_deref(), Some("u@example.com"));

    assert_eq!(f.authors.get_by_id(a.id).await.unwrap(), merged);
    assert!(logs_contain("Successfully updated Author with id=1"));
}

#[tokio::test]
async fn update_of_missing_row_is_not_found() {
    let f = fixture();
    let ghost = Author {
        id: 42,
        ..author("ghost")
    };

    let err = f.authors.update(ghost, &[], None).await.unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn where_clause_guards_update() {
    let f = fixture();
    let mut a = seed_authors(&f, &["Ursula"]).await.remove(0);
    a.name = "Changed".into();

    let err = f
        .authors
        .update(a.clone(), &[], Some("Name eq 'Somebody else'"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CrudError::Validation(ValidationError::WhereClauseMismatch { .. })
    ));
    assert_eq!(f.authors.get_by_id(1).await.unwrap().name, "Ursula");

    let ok = f
        .authors
        .update(a, &[], Some("startswith(Name,'chan')"))
        .await
        .unwrap();
    assert_eq!(ok.name, "Changed");
}

#[tokio::test]
async fn update_cannot_point_at_missing_reference() {
    let f = fixture();
    let a = seed_authors(&f, &["Ursula"]).await.remove(0);
    let mut b = f.books.create(book("Earthsea", 10.0, a.id), &[]).await.unwrap();

    b.author_id = 7;
    let err = f.books.update(b, &[], None).await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(f.books.get_by_id(1).await.unwrap().author_id, a.id);
}

#[traced_test]
#[tokio::test]
async fn delete_absent_then_present() {
    let f = fixture();
    seed_authors(&f, &["Ursula"]).await;

    assert!(!f.authors.delete(5).await.unwrap());
    assert!(f.authors.delete(1).await.unwrap());

    let err = f.authors.get_by_id(1).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Author with id 1 not found");
    assert!(f.authors.find_by_id(1).await.unwrap().is_none());
    assert!(!f.authors.exists(1).await.unwrap());
    assert!(logs_contain("Successfully deleted Author with id=1"));
}

#[tokio::test]
async fn ids_are_coerced_to_the_key_kind() {
    let f = fixture();
    seed_authors(&f, &["Ursula"]).await;

    assert!(f.authors.exists("1").await.unwrap());
    assert!(f.authors.exists(FieldValue::F64(1.0)).await.unwrap());
    assert!(f.authors.get_by_id("one").await.is_err());
}

#[tokio::test]
async fn list_paged_is_one_based_and_clamped() {
    let f = fixture_with(CrudConfig {
        default_page_size: 2,
        max_page_size: 3,
    });
    seed_authors(&f, &["a", "b", "c", "d", "e"]).await;

    let page = f.authors.list_paged(2, None).await.unwrap();
    assert_eq!(page.data.iter().map(|a| a.id).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!((page.total_count, page.page, page.page_size), (5, 2, 2));

    let first = f.authors.list_paged(0, Some(100)).await.unwrap();
    assert_eq!(first.page, 1);
    assert_eq!(first.page_size, 3);
    assert_eq!(first.data.len(), 3);
    assert!(first.has_next());

    assert_eq!(f.authors.list_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn query_paged_returns_the_window() {
    let f = fixture();
    seed_authors(&f, &["a", "b", "c", "d", "e", "f", "g"]).await;

    let q = Query::new().skip(5).take(3);
    let page = f.authors.query_paged(&q).await.unwrap();

    // min(take, total - skip)
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total_count, 7);
    assert_eq!(page.page, 5 / 3 + 1);
    assert_eq!(page.page_size, 3);
}

#[tokio::test]
async fn query_paged_rejects_take_above_the_maximum() {
    let f = fixture_with(CrudConfig {
        default_page_size: 2,
        max_page_size: 3,
    });
    seed_authors(&f, &["a", "b", "c", "d", "e"]).await;

    let err = f.authors.query_paged(&Query::new().take(10)).await.unwrap_err();
    assert!(matches!(
        err,
        CrudError::Query(QueryError::PageSizeTooLarge { requested: 10, max: 3 })
    ));
    let err = f
        .authors
        .query_select_paged(&Query::new().select(["Name"]).take(4))
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::Query(QueryError::PageSizeTooLarge { .. })));

    let full = f.authors.query_paged(&Query::new().skip(3).take(3)).await.unwrap();
    assert_eq!((full.data.len(), full.page, full.page_size), (2, 2, 3));

    let defaulted = f.authors.query_paged(&Query::new()).await.unwrap();
    assert_eq!(defaulted.data.len(), 2);
}

#[tokio::test]
async fn query_paged_with_zero_take_is_an_empty_page() {
    let f = fixture();
    seed_authors(&f, &["a", "b", "c"]).await;

    let page = f.authors.query_paged(&Query::new().take(0)).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!((page.total_count, page.page, page.page_size), (3, 1, 0));

    let page = f
        .authors
        .query_select_paged(&Query::new().select(["Name"]).skip(1).take(0))
        .await
        .unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total_count, 3);
}

#[tokio::test]
async fn count_ignores_the_window() {
    let f = fixture();
    seed_authors(&f, &["Ana", "Anabel", "Carlos"]).await;

    let q = Query::new()
        .filter(parse_filter("startswith(Name,'ana')").unwrap())
        .take(1);

    assert_eq!(f.authors.count(&q).await.unwrap(), 2);
    assert_eq!(f.authors.query(&q).await.unwrap().len(), 1);
}

#[tokio::test]
async fn includes_attach_related_rows() {
    let f = fixture();
    let authors = seed_authors(&f, &["Ursula", "Octavia", "Ted"]).await;
    f.books.create(book("Earthsea", 10.0, authors[0].id), &[]).await.unwrap();
    f.books.create(book("Lathe", 11.0, authors[0].id), &[]).await.unwrap();
    f.books.create(book("Kindred", 12.0, authors[1].id), &[]).await.unwrap();

    let q = Query::new().include("books").order_by(modkit_query::OrderKey::asc("Id"));
    let loaded = f.authors.query(&q).await.unwrap();

    let titles: Vec<Vec<&str>> = loaded
        .iter()
        .map(|a| a.books.iter().map(|b| b.title.as_str()).collect())
        .collect();
    assert_eq!(titles, vec![vec!["Earthsea", "Lathe"], vec!["Kindred"], vec![]]);

    let books = f.books.query(&Query::new().include("Author")).await.unwrap();
    assert!(books
        .iter()
        .all(|b| b.author.as_ref().map(|a| a.id) == Some(b.author_id)));
}

#[tokio::test]
async fn unknown_include_is_rejected() {
    let f = fixture();

    let err = f
        .authors
        .query(&Query::new().include("Reviews"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "unknown include: Reviews");
}

#[tokio::test]
async fn filter_input_drives_queries() {
    let f = fixture();
    seed_authors(&f, &["Ana María", "ana maría", "Carlos"]).await;

    let input = FilterInput::default().search(SearchTerm::new("ANA", ["Name", "Bio"]));
    let found = f.authors.query_input(input).await.unwrap();
    assert_eq!(found.len(), 2);

    let page = f
        .authors
        .query_input_paged(FilterInput::default().window(Some(1), Some(1)))
        .await
        .unwrap();
    assert_eq!((page.data.len(), page.total_count, page.page), (1, 3, 2));
}
