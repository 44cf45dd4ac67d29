use modkit_query::ast::{CompareOperator, Expr, TextFunction, Value};
use modkit_query::{Error, OrderKey, Query, QueryRequest};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn wire_shape_is_camel_case() {
    let req: QueryRequest = serde_json::from_value(json!({
        "include": ["Books"],
        "filter": "Name eq 'O''Brien'",
        "orderBy": "Name desc",
        "select": "Id, Name",
        "skip": 10,
        "take": 5
    }))
    .unwrap();

    let q = Query::try_from(&req).unwrap();
    assert_eq!(q.include, vec!["Books"]);
    assert_eq!(
        q.filter,
        Some(Expr::compare("Name", CompareOperator::Eq, "O'Brien".into()))
    );
    assert_eq!(q.order.keys(), &[OrderKey::desc("Name")]);
    assert_eq!(q.select, Some(vec!["Id".to_string(), "Name".to_string()]));
    assert_eq!(q.page(), 3);
}

#[test]
fn missing_members_default() {
    let req: QueryRequest = serde_json::from_value(json!({})).unwrap();
    assert_eq!(req, QueryRequest::default());
    let q = req.parse().unwrap();
    assert!(q.filter.is_none());
    assert!(q.order.is_empty());
    assert_eq!(q.page(), 1);
}

#[test]
fn blank_strings_count_as_absent() {
    let req = QueryRequest {
        filter: Some("   ".into()),
        order_by: Some(String::new()),
        select: Some(" ".into()),
        ..Default::default()
    };
    let q = req.parse().unwrap();
    assert_eq!(q, Query::default());
}

#[test]
fn render_then_parse_is_stable() {
    let q = Query::new()
        .include("Books")
        .filter(Expr::compare("Name", CompareOperator::Eq, "it's".into()))
        .filter(
            Expr::Text {
                func: TextFunction::StartsWith,
                field: "Title".into(),
                value: "a'b".into(),
            }
            .or(Expr::In {
                field: "Id".into(),
                values: vec![Value::from(1), Value::from(2)],
            }),
        )
        .filter(Expr::IsEmpty { field: "Bio".into() }.not())
        .order_by(OrderKey::desc("Name"))
        .order_by(OrderKey::asc("Id"))
        .select(["Id", "Name"])
        .skip(0)
        .take(20);

    let req = q.to_request();
    assert_eq!(
        req.filter.as_deref(),
        Some("Name eq 'it''s' and (startswith(Title,'a''b') or Id in (1, 2)) and not isempty(Bio)")
    );
    assert_eq!(req.order_by.as_deref(), Some("Name desc, Id"));
    assert_eq!(req.select.as_deref(), Some("Id, Name"));

    let back = Query::try_from(&req).unwrap();
    assert_eq!(back, q);
}

#[test]
fn parse_errors_name_the_member() {
    let req = QueryRequest {
        order_by: Some("Name, ".into()),
        ..Default::default()
    };
    match req.parse() {
        Err(Error::Parse { what, .. }) => assert_eq!(what, "orderBy"),
        other => panic!("expected parse error, got {other:?}"),
    }
}
