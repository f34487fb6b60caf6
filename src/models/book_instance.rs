use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "book_instances")]
pub struct Model {
    /// UUID, assigned at creation
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub book_id: i32,
    /// Publisher/edition text for this copy
    pub imprint: String,
    /// ISO `YYYY-MM-DD`; set while the copy is out on loan
    pub due_back: Option<String>,
    /// Availability status of this physical copy.
    /// Valid values:
    /// - `maintenance`: Pulled from circulation for repair
    /// - `on_loan`: Currently borrowed (has borrower and due date)
    /// - `available`: On shelf, can be loaned
    /// - `reserved`: Held for a reader
    pub status: String,
    pub borrower_id: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Book,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BorrowerId",
        to = "super::user::Column::Id"
    )]
    Borrower,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrower.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A copy is overdue when its due date is strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match &self.due_back {
            Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map(|due| due < today)
                .unwrap_or(false),
            None => false,
        }
    }
}
