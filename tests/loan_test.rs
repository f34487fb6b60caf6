use athenaeum::auth::create_jwt;
use athenaeum::services::account_service;
use athenaeum::{api, db};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Local};
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use tower::util::ServiceExt; // for `oneshot`

async fn setup_test_db() -> DatabaseConnection {
    db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB")
}

async fn create_test_user(db: &DatabaseConnection, username: &str) -> i32 {
    let now = chrono::Utc::now().to_rfc3339();
    let user = athenaeum::models::user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set("unused-in-this-test".to_string()),
        role: Set("member".to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    athenaeum::models::user::Entity::insert(user)
        .exec(db)
        .await
        .expect("Failed to create user")
        .last_insert_id
}

async fn create_test_book(db: &DatabaseConnection) -> i32 {
    let now = chrono::Utc::now().to_rfc3339();

    let author = athenaeum::models::author::ActiveModel {
        first_name: Set("Michael".to_string()),
        last_name: Set("Hartl".to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    let author_id = athenaeum::models::author::Entity::insert(author)
        .exec(db)
        .await
        .expect("Failed to create author")
        .last_insert_id;

    let language = athenaeum::models::language::ActiveModel {
        name: Set("English".to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    let language_id = athenaeum::models::language::Entity::insert(language)
        .exec(db)
        .await
        .expect("Failed to create language")
        .last_insert_id;

    let book = athenaeum::models::book::ActiveModel {
        title: Set("Ruby on Rails Tutorial".to_string()),
        author_id: Set(author_id),
        language_id: Set(language_id),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    athenaeum::models::book::Entity::insert(book)
        .exec(db)
        .await
        .expect("Failed to create book")
        .last_insert_id
}

async fn create_test_copy(
    db: &DatabaseConnection,
    book_id: i32,
    status: &str,
    borrower_id: Option<i32>,
    due_back: Option<String>,
) -> String {
    let now = chrono::Utc::now().to_rfc3339();
    let id = uuid::Uuid::new_v4().to_string();
    let copy = athenaeum::models::book_instance::ActiveModel {
        id: Set(id.clone()),
        book_id: Set(book_id),
        imprint: Set("Unlikely Imprint, 2020".to_string()),
        due_back: Set(due_back),
        status: Set(status.to_string()),
        borrower_id: Set(borrower_id),
        created_at: Set(now.clone()),
        updated_at: Set(now),
    };
    athenaeum::models::book_instance::Entity::insert(copy)
        .exec(db)
        .await
        .expect("Failed to create copy");
    id
}

fn bearer(username: &str) -> String {
    format!("Bearer {}", create_jwt(username, "member").unwrap())
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, Option<String>, serde_json::Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header("Authorization", token);
    }
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let location = resp
        .headers()
        .get("location")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, location, value)
}

#[tokio::test]
async fn test_my_books_requires_login() {
    let db = setup_test_db().await;

    let (status, location, _) = send(api::app_router(db), "GET", "/catalog/my-books/", None, None).await;
    assert!(status.is_redirection());
    assert_eq!(
        location.unwrap(),
        "/accounts/login/?next=/catalog/my-books/"
    );
}

#[tokio::test]
async fn test_my_books_only_lists_own_active_loans() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let user_2 = create_test_user(&db, "test_user_2").await;
    let book_id = create_test_book(&db).await;

    // 30 copies split between two borrowers, staggered due dates
    let today = Local::now().date_naive();
    for n in 0..30 {
        let borrower = if n % 2 == 1 { user_1 } else { user_2 };
        let due = (today + Duration::days(n % 5)).format("%Y-%m-%d").to_string();
        create_test_copy(&db, book_id, "on_loan", Some(borrower), Some(due)).await;
    }
    // Noise: copies of user_1 not out on loan must not appear
    create_test_copy(&db, book_id, "maintenance", Some(user_1), None).await;

    let (status, _, body) = send(
        api::app_router(db),
        "GET",
        "/catalog/my-books/",
        Some(&bearer("test_user_1")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let items = body["book_instances"].as_array().unwrap();
    assert_eq!(items.len(), 10); // first page of 15
    assert_eq!(body["total"], serde_json::json!(15));
    for item in items {
        assert_eq!(item["borrower_id"], serde_json::json!(user_1));
        assert_eq!(item["status"], serde_json::json!("on_loan"));
    }
}

#[tokio::test]
async fn test_my_books_ordered_by_due_date() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let book_id = create_test_book(&db).await;

    let today = Local::now().date_naive();
    for n in [4, 0, 2, 1, 3] {
        let due = (today + Duration::days(n)).format("%Y-%m-%d").to_string();
        create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;
    }

    let (status, _, body) = send(
        api::app_router(db),
        "GET",
        "/catalog/my-books/",
        Some(&bearer("test_user_1")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let items = body["book_instances"].as_array().unwrap();
    assert_eq!(items.len(), 5);

    let mut last_date = String::new();
    for item in items {
        let due = item["due_back"].as_str().unwrap().to_string();
        assert!(last_date <= due);
        last_date = due;
    }
}

#[tokio::test]
async fn test_all_borrowed_requires_permission() {
    let db = setup_test_db().await;

    create_test_user(&db, "plain_user").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let (status, _, _) = send(
        api::app_router(db.clone()),
        "GET",
        "/catalog/all-borrowed/",
        Some(&bearer("plain_user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(
        api::app_router(db),
        "GET",
        "/catalog/all-borrowed/",
        Some(&bearer("staff_user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_all_borrowed_sees_every_borrower() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let user_2 = create_test_user(&db, "test_user_2").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let today = Local::now().date_naive();
    for n in 0..6 {
        let borrower = if n % 2 == 1 { user_1 } else { user_2 };
        let due = (today + Duration::days(n)).format("%Y-%m-%d").to_string();
        create_test_copy(&db, book_id, "on_loan", Some(borrower), Some(due)).await;
    }

    let (status, _, body) = send(
        api::app_router(db),
        "GET",
        "/catalog/all-borrowed/",
        Some(&bearer("staff_user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], serde_json::json!(6));

    let items = body["book_instances"].as_array().unwrap();
    assert!(items
        .iter()
        .any(|i| i["borrower_username"] == serde_json::json!("test_user_1")));
    assert!(items
        .iter()
        .any(|i| i["borrower_username"] == serde_json::json!("test_user_2")));
}

#[tokio::test]
async fn test_renew_requires_login() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let book_id = create_test_book(&db).await;
    let due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id = create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;

    let (status, location, _) = send(
        api::app_router(db),
        "GET",
        &format!("/catalog/book/{}/renew/", copy_id),
        None,
        None,
    )
    .await;
    assert!(status.is_redirection());
    assert!(location.unwrap().starts_with("/accounts/login/"));
}

#[tokio::test]
async fn test_renew_without_permission_redirects_to_login() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let book_id = create_test_book(&db).await;
    let due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id = create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;

    let (status, location, _) = send(
        api::app_router(db),
        "GET",
        &format!("/catalog/book/{}/renew/", copy_id),
        Some(&bearer("test_user_1")),
        None,
    )
    .await;
    assert!(status.is_redirection());
    assert!(location.unwrap().starts_with("/accounts/login/"));
}

#[tokio::test]
async fn test_renew_form_proposes_three_weeks_out() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id = create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;

    let (status, _, body) = send(
        api::app_router(db),
        "GET",
        &format!("/catalog/book/{}/renew/", copy_id),
        Some(&bearer("staff_user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let expected = (Local::now().date_naive() + Duration::weeks(3))
        .format("%Y-%m-%d")
        .to_string();
    assert_eq!(
        body["form"]["initial"]["renewal_date"],
        serde_json::json!(expected)
    );
}

#[tokio::test]
async fn test_renew_unknown_copy_is_404() {
    let db = setup_test_db().await;

    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let (status, _, _) = send(
        api::app_router(db),
        "GET",
        "/catalog/book/1e511e51-1e51-1e51-1e51-1e511e511e51/renew/",
        Some(&bearer("staff_user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_renew_success_redirects_to_all_borrowed() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id = create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;

    let new_due = (Local::now().date_naive() + Duration::weeks(2))
        .format("%Y-%m-%d")
        .to_string();
    let (status, location, _) = send(
        api::app_router(db.clone()),
        "POST",
        &format!("/catalog/book/{}/renew/", copy_id),
        Some(&bearer("staff_user")),
        Some(serde_json::json!({ "renewal_date": new_due })),
    )
    .await;
    assert!(status.is_redirection());
    assert_eq!(location.unwrap(), "/catalog/all-borrowed/");

    let copy = athenaeum::models::book_instance::Entity::find_by_id(copy_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copy.due_back, Some(new_due));
}

#[tokio::test]
async fn test_renew_date_in_past_rerenders_with_error() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let original_due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id =
        create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(original_due.clone())).await;

    let bad_due = (Local::now().date_naive() - Duration::weeks(1))
        .format("%Y-%m-%d")
        .to_string();
    let (status, _, body) = send(
        api::app_router(db.clone()),
        "POST",
        &format!("/catalog/book/{}/renew/", copy_id),
        Some(&bearer("staff_user")),
        Some(serde_json::json!({ "renewal_date": bad_due })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["errors"]["renewal_date"],
        serde_json::json!("Invalid date - renewal in past")
    );

    // No commit
    let copy = athenaeum::models::book_instance::Entity::find_by_id(copy_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copy.due_back, Some(original_due));
}

#[tokio::test]
async fn test_renew_date_too_far_ahead_rerenders_with_error() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id = create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;

    let bad_due = (Local::now().date_naive() + Duration::weeks(5))
        .format("%Y-%m-%d")
        .to_string();
    let (status, _, body) = send(
        api::app_router(db),
        "POST",
        &format!("/catalog/book/{}/renew/", copy_id),
        Some(&bearer("staff_user")),
        Some(serde_json::json!({ "renewal_date": bad_due })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["errors"]["renewal_date"],
        serde_json::json!("Invalid date - renewal more than 4 weeks ahead")
    );
}

#[tokio::test]
async fn test_renew_unparseable_date_rerenders_with_error() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id = create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;

    let (status, _, body) = send(
        api::app_router(db),
        "POST",
        &format!("/catalog/book/{}/renew/", copy_id),
        Some(&bearer("staff_user")),
        Some(serde_json::json!({ "renewal_date": "not-a-date" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["errors"]["renewal_date"],
        serde_json::json!("Enter a valid date.")
    );
}

#[tokio::test]
async fn test_mark_returned_clears_loan() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let due = (Local::now().date_naive() + Duration::days(5))
        .format("%Y-%m-%d")
        .to_string();
    let copy_id = create_test_copy(&db, book_id, "on_loan", Some(user_1), Some(due)).await;

    let (status, _, _) = send(
        api::app_router(db.clone()),
        "POST",
        &format!("/catalog/book/{}/return/", copy_id),
        Some(&bearer("staff_user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let copy = athenaeum::models::book_instance::Entity::find_by_id(copy_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copy.status, "available");
    assert_eq!(copy.borrower_id, None);
    assert_eq!(copy.due_back, None);
}

#[tokio::test]
async fn test_cannot_return_copy_not_on_loan() {
    let db = setup_test_db().await;

    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let copy_id = create_test_copy(&db, book_id, "available", None, None).await;

    let (status, _, _) = send(
        api::app_router(db),
        "POST",
        &format!("/catalog/book/{}/return/", copy_id),
        Some(&bearer("staff_user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_borrow_puts_copy_on_loan() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let copy_id = create_test_copy(&db, book_id, "available", None, None).await;

    let (status, _, _) = send(
        api::app_router(db.clone()),
        "POST",
        &format!("/catalog/book/{}/borrow/", copy_id),
        Some(&bearer("staff_user")),
        Some(serde_json::json!({ "borrower_id": user_1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let copy = athenaeum::models::book_instance::Entity::find_by_id(copy_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copy.status, "on_loan");
    assert_eq!(copy.borrower_id, Some(user_1));
    assert!(copy.due_back.is_some());
}

#[tokio::test]
async fn test_borrow_rejects_unavailable_copy() {
    let db = setup_test_db().await;

    let user_1 = create_test_user(&db, "test_user_1").await;
    let staff = create_test_user(&db, "staff_user").await;
    account_service::grant_permission(&db, staff, "mark_returned")
        .await
        .unwrap();

    let book_id = create_test_book(&db).await;
    let copy_id = create_test_copy(&db, book_id, "maintenance", None, None).await;

    let (status, _, _) = send(
        api::app_router(db),
        "POST",
        &format!("/catalog/book/{}/borrow/", copy_id),
        Some(&bearer("staff_user")),
        Some(serde_json::json!({ "borrower_id": user_1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
