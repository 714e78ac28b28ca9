//! Postgres fixtures for store tests. Every test using them returns early when
//! `DATABASE_URL` is unset; rows are keyed by fresh uuids so tests can share a
//! database and run in parallel.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::database::{run_migrations, Database};
use crate::models::{
    AvailabilityWindow, Billable, BookingStatus, ContactMethod, CustomerRole, StaffRole,
    Transaction, WeeklyAvailability,
};
use crate::scheduling::{BusinessHours, ScheduleRules, WEEKDAYS};
use crate::store::accounts::{self, NewAccount, NewCustomerProfile, NewStaffProfile};
use crate::store::bookings::BookingDraft;
use crate::store::finances::{self, TransactionFilter};

pub async fn database() -> Option<Database> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping");
        return None;
    };
    let db = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    run_migrations(&db).await.expect("apply migrations");
    Some(db)
}

pub fn unique() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Shop open 08:00 to 18:00 UTC.
pub fn rules() -> ScheduleRules {
    ScheduleRules {
        hours: BusinessHours {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        },
        offset: FixedOffset::east_opt(0).unwrap(),
    }
}

/// `hour`:00 UTC on the given day of March 2031.
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2031, 3, day, hour, 0, 0).unwrap()
}

/// A calendar day no other test is likely to have written transactions on.
pub fn unused_date() -> NaiveDate {
    let offset = (Uuid::new_v4().as_u128() % 300_000) as u64;
    NaiveDate::from_ymd_opt(1000, 1, 1).unwrap() + Days::new(offset)
}

pub struct Customer {
    pub account_id: Uuid,
    pub profile_id: i64,
}

pub async fn customer(db: &Database) -> Customer {
    let mut conn = db.acquire().await.unwrap();
    let email = format!("{}@repairs.test", unique());
    let subject = unique();
    let account = accounts::insert_account(
        &mut *conn,
        &NewAccount {
            email: &email,
            external_subject: &subject,
            password_hash: "unused",
            first_name: Some("Wanjiru"),
            last_name: None,
            phone_number: None,
            is_staff: false,
        },
    )
    .await
    .unwrap();
    let profile = accounts::insert_customer_profile(
        &mut *conn,
        account.id,
        &NewCustomerProfile {
            role: CustomerRole::Individual,
            preferred_contact: ContactMethod::Email,
            company_name: None,
            address: String::new(),
        },
    )
    .await
    .unwrap();
    Customer {
        account_id: account.id,
        profile_id: profile.id,
    }
}

/// Technician available 08:00 to 18:00 every day of the week.
pub async fn technician(db: &Database) -> i64 {
    let mut conn = db.acquire().await.unwrap();
    let email = format!("{}@repairs.test", unique());
    let subject = unique();
    let account = accounts::insert_account(
        &mut *conn,
        &NewAccount {
            email: &email,
            external_subject: &subject,
            password_hash: "unused",
            first_name: Some("Otieno"),
            last_name: None,
            phone_number: None,
            is_staff: true,
        },
    )
    .await
    .unwrap();

    let availability: WeeklyAvailability = WEEKDAYS
        .iter()
        .map(|day| {
            let window = AvailabilityWindow {
                start: Some("08:00".to_string()),
                end: Some("18:00".to_string()),
            };
            (day.to_string(), window)
        })
        .collect();
    let profile = accounts::insert_staff_profile(
        &mut *conn,
        account.id,
        &NewStaffProfile {
            role: StaffRole::Technician,
            specializations: vec!["laptops".to_string()],
            availability,
        },
    )
    .await
    .unwrap();
    profile.id
}

/// A laptop detailed service under a fresh category and service.
pub async fn detailed_service(db: &Database, price: i64, minutes: i32) -> i64 {
    sqlx::query_scalar(
        r#"
        WITH c AS (INSERT INTO service_categories (name) VALUES ($1) RETURNING id),
             s AS (INSERT INTO services (category_id, name, estimated_minutes)
                   SELECT id, $1, $2 FROM c RETURNING id)
        INSERT INTO detailed_services (service_id, device_type, changes_to_make, price)
        SELECT id, 'laptop', 'bench repair', $3 FROM s
        RETURNING id
        "#,
    )
    .bind(unique())
    .bind(minutes)
    .bind(Decimal::from(price))
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn device(db: &Database, owner: Uuid) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO devices (owner_id, brand, model, serial_number) VALUES ($1, 'Dell', 'Latitude 5420', $2) RETURNING id",
    )
    .bind(owner)
    .bind(unique())
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn shop_part(db: &Database, quantity: i32, price: i64) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO device_parts (name, model, serial_number, price, quantity, status)
        VALUES ('8GB DDR4 RAM', 'CT8G4DFS8266', $1, $2, $3, 'in_stock')
        RETURNING id
        "#,
    )
    .bind(unique())
    .bind(Decimal::from(price))
    .bind(quantity)
    .fetch_one(db)
    .await
    .unwrap()
}

/// A part fitted in a customer's device rather than held in shop stock.
pub async fn customer_part(db: &Database, device_id: i64) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO device_parts (device_id, name, model, serial_number, quantity)
        VALUES ($1, '500GB SSD SATA', 'Samsung 860 EVO', $2, 1)
        RETURNING id
        "#,
    )
    .bind(device_id)
    .bind(unique())
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn stock_of(db: &Database, part_id: i64) -> i32 {
    sqlx::query_scalar("SELECT quantity FROM device_parts WHERE id = $1")
        .bind(part_id)
        .fetch_one(db)
        .await
        .unwrap()
}

pub fn draft(
    customer: &Customer,
    detailed_service_id: i64,
    technician_id: Option<i64>,
    scheduled_time: DateTime<Utc>,
) -> BookingDraft {
    BookingDraft {
        customer_id: customer.profile_id,
        technician_id,
        detailed_service_id,
        device_id: None,
        scheduled_time,
        status: BookingStatus::Confirmed,
        notes: String::new(),
        diagnosis: String::new(),
        parts: Vec::new(),
    }
}

/// The live payment transaction written alongside a booking.
pub async fn booking_transaction(db: &Database, booking_id: i64) -> Transaction {
    let filter = TransactionFilter {
        billable: Some(Billable::Booking(booking_id)),
        ..TransactionFilter::default()
    };
    let mut transactions = finances::list_transactions(db, &filter).await.unwrap();
    assert_eq!(transactions.len(), 1);
    transactions.remove(0)
}
