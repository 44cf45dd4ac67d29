mod common;

use common::*;
use modkit_crud::{CrudError, Query, QueryError, QueryRequest};
use modkit_query::{FilterDescriptor, FilterInput, FilterOp, SortDir, SortState};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn names(f: &Fixture, q: &Query) -> Vec<String> {
    f.authors
        .query(q)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect()
}

fn filter(src: &str) -> Query {
    QueryRequest {
        filter: Some(src.to_string()),
        order_by: Some("Id".into()),
        ..Default::default()
    }
    .parse()
    .unwrap()
}

#[tokio::test]
async fn contains_is_case_insensitive() {
    let f = fixture();
    seed_authors(&f, &["Ana María", "ana maría", "Carlos"]).await;

    let input = FilterInput::default().filter(FilterDescriptor::new("Name", FilterOp::Contains, json!("Ana")));
    let found: Vec<String> = f
        .authors
        .query_input(input)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();

    assert_eq!(found, vec!["Ana María", "ana maría"]);
}

#[tokio::test]
async fn equality_is_case_sensitive() {
    let f = fixture();
    seed_authors(&f, &["Ana", "ana"]).await;

    assert_eq!(names(&f, &filter("Name eq 'Ana'")).await, vec!["Ana"]);
    assert_eq!(names(&f, &filter("Name ne 'Ana'")).await, vec!["ana"]);
}

#[tokio::test]
async fn null_fields_never_match_comparisons() {
    let f = fixture();
    seed_authors(&f, &["NoBio"]).await;
    let mut with_bio = author("WithBio");
    with_bio.bio = Some("short".into());
    f.authors.create(with_bio, &[]).await.unwrap();

    assert_eq!(names(&f, &filter("Bio ne 'long'")).await, vec!["WithBio"]);
    assert_eq!(names(&f, &filter("not Bio eq 'short'")).await, Vec::<String>::new());
    assert_eq!(names(&f, &filter("Bio eq null")).await, vec!["NoBio"]);
    assert_eq!(names(&f, &filter("Bio ne null")).await, vec!["WithBio"]);
}

#[tokio::test]
async fn empty_checks_cover_null_and_blank() {
    let f = fixture();
    let mut blank = author("Blank");
    blank.bio = Some(String::new());
    let mut full = author("Full");
    full.bio = Some("bio".into());
    f.authors.create(author("Null"), &[]).await.unwrap();
    f.authors.create(blank, &[]).await.unwrap();
    f.authors.create(full, &[]).await.unwrap();

    let empty = FilterInput::default()
        .filter(FilterDescriptor::new("Bio", FilterOp::IsEmpty, json!(null)))
        .sort(modkit_query::SortDescriptor::new("Id", SortDir::Asc));
    let not_empty =
        FilterInput::default().filter(FilterDescriptor::new("bio", FilterOp::IsNotEmpty, json!(null)));

    let got: Vec<String> = f.authors.query_input(empty).await.unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(got, vec!["Null", "Blank"]);
    let got: Vec<String> = f.authors.query_input(not_empty).await.unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(got, vec!["Full"]);
}

#[tokio::test]
async fn numeric_comparisons_need_numbers() {
    let f = fixture();
    let a = seed_authors(&f, &["Ursula"]).await.remove(0);
    for (title, price) in [("Cheap", 5.0), ("Mid", 15.0), ("Dear", 30.0)] {
        f.books.create(book(title, price, a.id), &[]).await.unwrap();
    }

    let q = Query::try_from(&QueryRequest {
        filter: Some("Price ge 15 and Price lt '30'".into()),
        ..Default::default()
    })
    .unwrap();
    let titles: Vec<String> = f.books.query(&q).await.unwrap().into_iter().map(|b| b.title).collect();
    assert_eq!(titles, vec!["Mid"]);

    let bad = FilterInput::default().filter(FilterDescriptor::new("Price", FilterOp::GreaterThan, json!("cheap")));
    let err = f.books.query_input(bad).await.unwrap_err();
    assert!(matches!(err, CrudError::Query(QueryError::NotNumeric { .. })), "{err:?}");
}

#[tokio::test]
async fn unknown_fields_and_operators_are_rejected() {
    let f = fixture();

    let err = f.authors.query(&filter("Nickname eq 'x'")).await.unwrap_err();
    assert!(matches!(err, CrudError::Query(QueryError::UnknownField(ref n)) if n == "Nickname"));

    let raw = json!({ "field": "Name", "operator": "Resembles", "value": "x" });
    assert!(serde_json::from_value::<FilterDescriptor>(raw).is_err());
    let parsed: Result<FilterOp, _> = "resembles".parse();
    let err: CrudError = parsed.unwrap_err().into();
    assert!(matches!(err, CrudError::Query(QueryError::UnknownOperator(_))));
}

#[tokio::test]
async fn text_functions_need_text_fields() {
    let f = fixture();

    let err = f.authors.query(&filter("contains(Id,'1')")).await.unwrap_err();

    assert!(matches!(err, CrudError::Query(QueryError::TypeMismatch { .. })));
}

#[tokio::test]
async fn sort_x_then_y_orders_by_y_only() {
    let f = fixture();
    let a = seed_authors(&f, &["Ursula"]).await.remove(0);
    for (title, price) in [("B", 1.0), ("A", 3.0), ("C", 2.0)] {
        f.books.create(book(title, price, a.id), &[]).await.unwrap();
    }

    let mut sort = SortState::new();
    sort.apply("Title", SortDir::Asc);
    sort.apply("Price", SortDir::Desc);
    let input = FilterInput {
        sorts: sort.sorts().to_vec(),
        ..Default::default()
    };
    let titles: Vec<String> = f.books.query_input(input).await.unwrap().into_iter().map(|b| b.title).collect();

    assert_eq!(titles, vec!["A", "C", "B"]);
}

#[tokio::test]
async fn chained_sort_keys_apply_left_to_right() {
    let f = fixture();
    seed_authors(&f, &["b", "a", "b", "a"]).await;

    let q = QueryRequest {
        order_by: Some("Name, Id desc".into()),
        ..Default::default()
    }
    .parse()
    .unwrap();
    let ids: Vec<i64> = f.authors.query(&q).await.unwrap().into_iter().map(|a| a.id).collect();

    assert_eq!(ids, vec![4, 2, 3, 1]);
}

#[tokio::test]
async fn in_lists_and_logical_grouping() {
    let f = fixture();
    seed_authors(&f, &["a", "b", "c", "d"]).await;

    assert_eq!(names(&f, &filter("Id in (1, 3)")).await, vec!["a", "c"]);
    assert_eq!(
        names(&f, &filter("(Name eq 'a' or Name eq 'b') and not Id eq 1")).await,
        vec!["b"]
    );
}

#[tokio::test]
async fn wire_request_runs_end_to_end() {
    let f = fixture();
    seed_authors(&f, &["O'Brien", "Smith", "O'Neil"]).await;

    let req: QueryRequest = serde_json::from_value(json!({
        "filter": "startswith(Name,'O''')",
        "orderBy": "Name desc",
        "skip": 0,
        "take": 1
    }))
    .unwrap();
    let page = f.authors.query_paged(&req.parse().unwrap()).await.unwrap();

    assert_eq!(page.total_count, 2);
    assert_eq!(page.data[0].name, "O'Neil");
}
