//! Loan Service - borrowing and renewal logic without the HTTP layer

use chrono::{Duration, Local, NaiveDate};
use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::book::Entity as Book;
use crate::models::book_instance::{self, Entity as BookInstance};
use crate::models::user::{self, Entity as User};

/// Error type for service operations
#[derive(Debug)]
pub enum ServiceError {
    Database(String),
    NotFound,
    InvalidState(String),
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(e: sea_orm::DbErr) -> Self {
        ServiceError::Database(e.to_string())
    }
}

/// Proposed due date pre-filled into the renewal form.
pub fn default_renewal_date(today: NaiveDate) -> NaiveDate {
    today + Duration::weeks(3)
}

/// Check a submitted renewal date against the lending policy: not in the
/// past, and at most 4 weeks out. Returns the field error message otherwise.
pub fn validate_renewal_date(date: NaiveDate, today: NaiveDate) -> Result<(), &'static str> {
    if date < today {
        return Err("Invalid date - renewal in past");
    }
    if date > today + Duration::weeks(4) {
        return Err("Invalid date - renewal more than 4 weeks ahead");
    }
    Ok(())
}

/// Borrowed copy enriched with book and borrower info for the listings
#[derive(Debug, Clone, serde::Serialize)]
pub struct BorrowedCopy {
    pub id: String,
    pub book_id: i32,
    pub book_title: String,
    pub imprint: String,
    pub due_back: Option<String>,
    pub status: String,
    pub borrower_id: Option<i32>,
    pub borrower_username: Option<String>,
    pub is_overdue: bool,
}

#[derive(Debug)]
pub struct BorrowedPage {
    pub items: Vec<BorrowedCopy>,
    pub total: u64,
    pub num_pages: u64,
    pub page: u64,
}

/// List on-loan copies, earliest due date first (copies with no due date
/// sort first). `borrower` restricts the listing to one user's loans.
/// `page` is 1-based.
pub async fn list_borrowed(
    db: &DatabaseConnection,
    borrower: Option<i32>,
    page: u64,
    per_page: u64,
) -> Result<BorrowedPage, ServiceError> {
    let mut query = BookInstance::find()
        .filter(book_instance::Column::Status.eq("on_loan"))
        .order_by_asc(book_instance::Column::DueBack);

    if let Some(borrower_id) = borrower {
        query = query.filter(book_instance::Column::BorrowerId.eq(borrower_id));
    }

    let paginator = query.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let num_pages = paginator.num_pages().await?;

    let page = page.max(1);
    let copies = paginator.fetch_page(page - 1).await?;

    // Fetch related books and borrowers in one pass each
    let book_ids: Vec<i32> = copies.iter().map(|c| c.book_id).collect();
    let borrower_ids: Vec<i32> = copies.iter().filter_map(|c| c.borrower_id).collect();

    let mut book_titles: HashMap<i32, String> = HashMap::new();
    if !book_ids.is_empty() {
        for book in Book::find()
            .filter(crate::models::book::Column::Id.is_in(book_ids))
            .all(db)
            .await?
        {
            book_titles.insert(book.id, book.title);
        }
    }

    let mut usernames: HashMap<i32, String> = HashMap::new();
    if !borrower_ids.is_empty() {
        for u in User::find()
            .filter(user::Column::Id.is_in(borrower_ids))
            .all(db)
            .await?
        {
            usernames.insert(u.id, u.username);
        }
    }

    let today = Local::now().date_naive();

    let items = copies
        .into_iter()
        .map(|copy| {
            let book_title = book_titles
                .get(&copy.book_id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            let borrower_username = copy.borrower_id.and_then(|id| usernames.get(&id).cloned());
            let is_overdue = copy.is_overdue(today);

            BorrowedCopy {
                id: copy.id,
                book_id: copy.book_id,
                book_title,
                imprint: copy.imprint,
                due_back: copy.due_back,
                status: copy.status,
                borrower_id: copy.borrower_id,
                borrower_username,
                is_overdue,
            }
        })
        .collect();

    Ok(BorrowedPage {
        items,
        total,
        num_pages,
        page,
    })
}

pub async fn find_copy(
    db: &DatabaseConnection,
    copy_id: &str,
) -> Result<book_instance::Model, ServiceError> {
    BookInstance::find_by_id(copy_id.to_owned())
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)
}

/// Commit a renewal: write the new due date on the copy.
pub async fn renew(
    db: &DatabaseConnection,
    copy_id: &str,
    new_due_back: NaiveDate,
) -> Result<book_instance::Model, ServiceError> {
    let copy = find_copy(db, copy_id).await?;

    let mut active: book_instance::ActiveModel = copy.into();
    active.due_back = Set(Some(new_due_back.format("%Y-%m-%d").to_string()));
    active.updated_at = Set(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

    Ok(active.update(db).await?)
}

/// Mark an on-loan copy returned: back on the shelf, borrower and due date
/// cleared.
pub async fn mark_returned(
    db: &DatabaseConnection,
    copy_id: &str,
) -> Result<book_instance::Model, ServiceError> {
    let copy = find_copy(db, copy_id).await?;

    if copy.status != "on_loan" {
        return Err(ServiceError::InvalidState(format!(
            "Copy is currently {}",
            copy.status
        )));
    }

    let mut active: book_instance::ActiveModel = copy.into();
    active.status = Set("available".to_owned());
    active.borrower_id = Set(None);
    active.due_back = Set(None);
    active.updated_at = Set(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

    Ok(active.update(db).await?)
}

/// Lend an available copy to a borrower until `due_back`.
pub async fn borrow(
    db: &DatabaseConnection,
    copy_id: &str,
    borrower_id: i32,
    due_back: NaiveDate,
) -> Result<book_instance::Model, ServiceError> {
    let copy = find_copy(db, copy_id).await?;

    if copy.status != "available" {
        return Err(ServiceError::InvalidState(format!(
            "Copy is currently {}",
            copy.status
        )));
    }

    let mut active: book_instance::ActiveModel = copy.into();
    active.status = Set("on_loan".to_owned());
    active.borrower_id = Set(Some(borrower_id));
    active.due_back = Set(Some(due_back.format("%Y-%m-%d").to_string()));
    active.updated_at = Set(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

    Ok(active.update(db).await?)
}

/// Create a copy of a book, `available` unless another status is given.
pub async fn create_copy(
    db: &DatabaseConnection,
    book_id: i32,
    imprint: &str,
    status: Option<String>,
) -> Result<book_instance::Model, ServiceError> {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let copy = book_instance::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        book_id: Set(book_id),
        imprint: Set(imprint.to_owned()),
        due_back: Set(None),
        status: Set(status.unwrap_or_else(|| "available".to_owned())),
        borrower_id: Set(None),
        created_at: Set(now.clone()),
        updated_at: Set(now),
    };

    Ok(copy.insert(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn renewal_date_in_past_is_rejected() {
        let today = day(2026, 3, 10);
        assert_eq!(
            validate_renewal_date(day(2026, 3, 9), today),
            Err("Invalid date - renewal in past")
        );
    }

    #[test]
    fn renewal_date_today_is_accepted() {
        let today = day(2026, 3, 10);
        assert_eq!(validate_renewal_date(today, today), Ok(()));
    }

    #[test]
    fn renewal_date_four_weeks_out_is_accepted() {
        let today = day(2026, 3, 10);
        assert_eq!(validate_renewal_date(today + Duration::weeks(4), today), Ok(()));
    }

    #[test]
    fn renewal_date_past_four_weeks_is_rejected() {
        let today = day(2026, 3, 10);
        assert_eq!(
            validate_renewal_date(today + Duration::weeks(4) + Duration::days(1), today),
            Err("Invalid date - renewal more than 4 weeks ahead")
        );
        assert_eq!(
            validate_renewal_date(today + Duration::weeks(5), today),
            Err("Invalid date - renewal more than 4 weeks ahead")
        );
    }

    #[test]
    fn default_renewal_is_three_weeks_out() {
        let today = day(2026, 3, 10);
        assert_eq!(default_renewal_date(today), day(2026, 3, 31));
    }
}
