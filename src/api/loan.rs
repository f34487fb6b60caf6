use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{Local, NaiveDate};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;
use serde_json::json;

use super::{PageQuery, PAGE_SIZE};
use crate::auth::{login_redirect, Claims};
use crate::models::user::Entity as User;
use crate::services::account_service;
use crate::services::loan_service::{self, ServiceError};

fn service_error_response(e: ServiceError) -> Response {
    match e {
        ServiceError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Book copy not found" })),
        )
            .into_response(),
        ServiceError::InvalidState(msg) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
        }
        ServiceError::Database(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": msg })),
        )
            .into_response(),
    }
}

fn borrowed_page_json(page: loan_service::BorrowedPage) -> Json<serde_json::Value> {
    Json(json!({
        "book_instances": page.items,
        "page": page.page,
        "num_pages": page.num_pages,
        "total": page.total,
        "is_paginated": page.num_pages > 1,
    }))
}

/// The caller's active loans, earliest due date first.
pub async fn my_books(
    State(db): State<DatabaseConnection>,
    Query(query): Query<PageQuery>,
    claims: Claims,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match loan_service::list_borrowed(&db, Some(user.id), query.page(), PAGE_SIZE).await {
        Ok(page) => borrowed_page_json(page).into_response(),
        Err(e) => service_error_response(e),
    }
}

/// Every active loan in the library. Staff only.
pub async fn all_borrowed(
    State(db): State<DatabaseConnection>,
    Query(query): Query<PageQuery>,
    claims: Claims,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "mark_returned").await {
        return resp;
    }

    match loan_service::list_borrowed(&db, None, query.page(), PAGE_SIZE).await {
        Ok(page) => borrowed_page_json(page).into_response(),
        Err(e) => service_error_response(e),
    }
}

/// The renewal routes send a permission-less caller back to login rather
/// than answering 403.
async fn librarian_gate(
    db: &DatabaseConnection,
    claims: &Claims,
    next: &str,
) -> Result<(), Response> {
    let user = match super::require_user(db, claims).await {
        Ok(u) => u,
        Err(resp) => return Err(resp),
    };

    match account_service::has_permission(db, user.id, "mark_returned").await {
        Ok(true) => Ok(()),
        Ok(false) => Err(login_redirect(next).into_response()),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response()),
    }
}

/// Renewal form for one copy, pre-filled with the proposed due date.
pub async fn renew_form(
    State(db): State<DatabaseConnection>,
    Path(id): Path<String>,
    claims: Claims,
) -> Response {
    let next = format!("/catalog/book/{}/renew/", id);
    if let Err(resp) = librarian_gate(&db, &claims, &next).await {
        return resp;
    }

    let copy = match loan_service::find_copy(&db, &id).await {
        Ok(c) => c,
        Err(e) => return service_error_response(e),
    };

    let proposed = loan_service::default_renewal_date(Local::now().date_naive());

    (
        StatusCode::OK,
        Json(json!({
            "form": {
                "initial": { "renewal_date": proposed.format("%Y-%m-%d").to_string() }
            },
            "book_instance": copy,
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct RenewForm {
    pub renewal_date: String,
}

pub async fn renew_submit(
    State(db): State<DatabaseConnection>,
    Path(id): Path<String>,
    claims: Claims,
    Json(payload): Json<RenewForm>,
) -> Response {
    let next = format!("/catalog/book/{}/renew/", id);
    if let Err(resp) = librarian_gate(&db, &claims, &next).await {
        return resp;
    }

    // 404 before validation, like any detail route
    if let Err(e) = loan_service::find_copy(&db, &id).await {
        return service_error_response(e);
    }

    // A failed form comes back 200 with the field error, uncommitted
    let date = match NaiveDate::parse_from_str(&payload.renewal_date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => return renewal_rerender(&payload.renewal_date, "Enter a valid date."),
    };

    let today = Local::now().date_naive();
    if let Err(message) = loan_service::validate_renewal_date(date, today) {
        return renewal_rerender(&payload.renewal_date, message);
    }

    match loan_service::renew(&db, &id, date).await {
        Ok(copy) => {
            tracing::info!("Copy {} renewed until {:?}", copy.id, copy.due_back);
            Redirect::to("/catalog/all-borrowed/").into_response()
        }
        Err(e) => service_error_response(e),
    }
}

fn renewal_rerender(submitted: &str, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "form": { "renewal_date": submitted },
            "errors": { "renewal_date": message },
        })),
    )
        .into_response()
}

/// Shelve a returned copy.
pub async fn mark_returned(
    State(db): State<DatabaseConnection>,
    Path(id): Path<String>,
    claims: Claims,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "mark_returned").await {
        return resp;
    }

    match loan_service::mark_returned(&db, &id).await {
        Ok(copy) => (
            StatusCode::OK,
            Json(json!({ "message": "Copy returned", "book_instance": copy })),
        )
            .into_response(),
        Err(e) => service_error_response(e),
    }
}

#[derive(Deserialize)]
pub struct BorrowRequest {
    pub borrower_id: i32,
    pub due_back: Option<String>,
}

/// Lend an available copy out. Due date defaults to the standard loan
/// period when the form leaves it blank.
pub async fn borrow(
    State(db): State<DatabaseConnection>,
    Path(id): Path<String>,
    claims: Claims,
    Json(payload): Json<BorrowRequest>,
) -> Response {
    let user = match super::require_user(&db, &claims).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = super::require_permission(&db, &user, "mark_returned").await {
        return resp;
    }

    let borrower = User::find_by_id(payload.borrower_id)
        .one(&db)
        .await
        .unwrap_or(None);
    if borrower.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": { "borrower_id": "Unknown borrower." } })),
        )
            .into_response();
    }

    let today = Local::now().date_naive();
    let due_back = match payload.due_back.as_deref() {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "errors": { "due_back": "Enter a valid date." } })),
                )
                    .into_response()
            }
        },
        None => loan_service::default_renewal_date(today),
    };

    match loan_service::borrow(&db, &id, payload.borrower_id, due_back).await {
        Ok(copy) => (
            StatusCode::OK,
            Json(json!({ "message": "Copy loaned", "book_instance": copy })),
        )
            .into_response(),
        Err(e) => service_error_response(e),
    }
}
