//! Starter catalog and shop stock for a fresh installation.
//!
//! Seeding is idempotent: rows that already exist (matched by category name,
//! service name within its category, service/device pair, or part serial) are
//! left untouched, so the command can be rerun after upgrades.

use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::database::Database;
use crate::error::Result;
use crate::models::DeviceType;

struct CategorySeed {
    name: &'static str,
    description: &'static str,
    services: &'static [ServiceSeed],
}

struct ServiceSeed {
    name: &'static str,
    description: &'static str,
    minutes: i32,
    /// (device type, price, changes to make)
    details: &'static [(DeviceType, i64, &'static str)],
}

struct PartSeed {
    name: &'static str,
    model: &'static str,
    price: i64,
    quantity: i32,
    warranty_months: i32,
    minimum_stock: i32,
}

const CATALOG: &[CategorySeed] = &[
    CategorySeed {
        name: "Hardware Repairs",
        description: "Physical repairs and component replacements",
        services: &[
            ServiceSeed {
                name: "Screen Replacement",
                description: "Replace damaged or faulty display screens",
                minutes: 90,
                details: &[
                    (DeviceType::Laptop, 15000, "Replace laptop screen with new compatible model"),
                    (DeviceType::Desktop, 20000, "Replace desktop monitor"),
                ],
            },
            ServiceSeed {
                name: "Battery Replacement",
                description: "Replace old or faulty batteries",
                minutes: 45,
                details: &[(
                    DeviceType::Laptop,
                    8000,
                    "Replace laptop battery with new compatible model",
                )],
            },
        ],
    },
    CategorySeed {
        name: "Software Services",
        description: "Software installation, updates, and troubleshooting",
        services: &[
            ServiceSeed {
                name: "Operating System Installation",
                description: "Fresh installation or upgrade of operating systems",
                minutes: 120,
                details: &[
                    (DeviceType::Laptop, 5000, "Install and configure operating system with necessary drivers"),
                    (DeviceType::Desktop, 5000, "Install and configure operating system with necessary drivers"),
                ],
            },
            ServiceSeed {
                name: "Virus Removal",
                description: "Remove malware and viruses, install protection",
                minutes: 90,
                details: &[
                    (DeviceType::Laptop, 3500, "Scan and remove viruses, install antivirus"),
                    (DeviceType::Desktop, 3500, "Scan and remove viruses, install antivirus"),
                ],
            },
        ],
    },
    CategorySeed {
        name: "Maintenance Services",
        description: "Regular maintenance and cleaning services",
        services: &[ServiceSeed {
            name: "Deep Cleaning",
            description: "Thorough cleaning of device components",
            minutes: 60,
            details: &[
                (DeviceType::Laptop, 3000, "Deep clean laptop including keyboard and fans"),
                (DeviceType::Desktop, 3500, "Deep clean desktop components and peripherals"),
                (DeviceType::Printer, 2500, "Clean printer components and calibrate"),
            ],
        }],
    },
    CategorySeed {
        name: "Data Services",
        description: "Data recovery and backup solutions",
        services: &[
            ServiceSeed {
                name: "Data Recovery",
                description: "Recover data from damaged or corrupted storage",
                minutes: 180,
                details: &[
                    (DeviceType::Laptop, 7500, "Recover data from damaged hard drive"),
                    (DeviceType::Desktop, 7500, "Recover data from damaged hard drive"),
                ],
            },
            ServiceSeed {
                name: "Data Backup",
                description: "Create backups of important data",
                minutes: 60,
                details: &[
                    (DeviceType::Laptop, 2500, "Create comprehensive data backup"),
                    (DeviceType::Desktop, 2500, "Create comprehensive data backup"),
                ],
            },
        ],
    },
];

const PARTS: &[PartSeed] = &[
    PartSeed { name: "15.6\" FHD Laptop Screen", model: "LP156WF6-SPB1", price: 12000, quantity: 10, warranty_months: 12, minimum_stock: 3 },
    PartSeed { name: "14\" HD Laptop Screen", model: "B140XTN07.2", price: 10000, quantity: 10, warranty_months: 12, minimum_stock: 3 },
    PartSeed { name: "Laptop Battery - ThinkPad Compatible", model: "45N1001", price: 6500, quantity: 12, warranty_months: 6, minimum_stock: 5 },
    PartSeed { name: "Laptop Battery - Dell Compatible", model: "WDX0R", price: 7000, quantity: 12, warranty_months: 6, minimum_stock: 5 },
    PartSeed { name: "1TB SSD NVMe", model: "Samsung 970 EVO", price: 15000, quantity: 8, warranty_months: 24, minimum_stock: 3 },
    PartSeed { name: "500GB SSD SATA", model: "Samsung 860 EVO", price: 8000, quantity: 8, warranty_months: 24, minimum_stock: 3 },
    PartSeed { name: "8GB DDR4 RAM", model: "Crucial CT8G4DFS8266", price: 4500, quantity: 16, warranty_months: 12, minimum_stock: 8 },
    PartSeed { name: "16GB DDR4 RAM", model: "Crucial CT16G4DFD8266", price: 9000, quantity: 12, warranty_months: 12, minimum_stock: 5 },
    PartSeed { name: "Printer Maintenance Kit", model: "HP F2G76A", price: 12000, quantity: 5, warranty_months: 6, minimum_stock: 2 },
    PartSeed { name: "Power Supply Unit 650W", model: "Corsair RM650x", price: 11000, quantity: 6, warranty_months: 24, minimum_stock: 2 },
];

/// Rows created by one seeding run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub categories: u64,
    pub services: u64,
    pub detailed_services: u64,
    pub parts: u64,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        *self == SeedReport::default()
    }
}

/// Serial numbers of seeded parts, stable across runs.
fn seed_serial(model: &str) -> String {
    let slug: String = model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '-' })
        .collect();
    format!("SEED-{slug}")
}

/// Id of the row, and whether this call created it.
async fn ensure_category(conn: &mut PgConnection, seed: &CategorySeed) -> Result<(i64, bool)> {
    let row: (i64, bool) = sqlx::query_as(
        r#"
        WITH ins AS (
            INSERT INTO service_categories (name, description) VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING id
        )
        SELECT id, TRUE FROM ins
        UNION ALL
        SELECT id, FALSE FROM service_categories WHERE LOWER(name) = LOWER($1)
        LIMIT 1
        "#,
    )
    .bind(seed.name)
    .bind(seed.description)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

async fn ensure_service(
    conn: &mut PgConnection,
    category_id: i64,
    seed: &ServiceSeed,
) -> Result<(i64, bool)> {
    let row: (i64, bool) = sqlx::query_as(
        r#"
        WITH ins AS (
            INSERT INTO services (category_id, name, description, estimated_minutes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING id
        )
        SELECT id, TRUE FROM ins
        UNION ALL
        SELECT id, FALSE FROM services WHERE category_id = $1 AND LOWER(name) = LOWER($2)
        LIMIT 1
        "#,
    )
    .bind(category_id)
    .bind(seed.name)
    .bind(seed.description)
    .bind(seed.minutes)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

async fn seed_catalog(conn: &mut PgConnection, report: &mut SeedReport) -> Result<()> {
    for category in CATALOG {
        let (category_id, created) = ensure_category(&mut *conn, category).await?;
        report.categories += u64::from(created);

        for service in category.services {
            let (service_id, created) = ensure_service(&mut *conn, category_id, service).await?;
            report.services += u64::from(created);

            for (device_type, price, changes) in service.details {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO detailed_services (service_id, device_type, changes_to_make, price, notes)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (service_id, device_type) DO NOTHING
                    "#,
                )
                .bind(service_id)
                .bind(*device_type)
                .bind(*changes)
                .bind(Decimal::from(*price))
                .bind(format!("Standard {} for {}", service.name, device_type.as_str()))
                .execute(&mut *conn)
                .await?
                .rows_affected();
                report.detailed_services += inserted;
            }
        }
    }
    Ok(())
}

async fn seed_parts(conn: &mut PgConnection, report: &mut SeedReport) -> Result<()> {
    for part in PARTS {
        let inserted = sqlx::query(
            r#"
            INSERT INTO device_parts
                (name, model, serial_number, price, quantity, status, warranty_months, minimum_stock)
            VALUES ($1, $2, $3, $4, $5, 'in_stock', $6, $7)
            ON CONFLICT (serial_number) DO NOTHING
            "#,
        )
        .bind(part.name)
        .bind(part.model)
        .bind(seed_serial(part.model))
        .bind(Decimal::from(part.price))
        .bind(part.quantity)
        .bind(part.warranty_months)
        .bind(part.minimum_stock)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        report.parts += inserted;
    }
    Ok(())
}

/// Load the starter catalog and shop stock in one transaction.
pub async fn run(db: &Database) -> Result<SeedReport> {
    let mut tx = db.begin().await?;
    let mut report = SeedReport::default();
    seed_catalog(&mut *tx, &mut report).await?;
    seed_parts(&mut *tx, &mut report).await?;
    tx.commit().await?;

    log::info!(
        "seeded {} categories, {} services, {} detailed services, {} parts",
        report.categories,
        report.services,
        report.detailed_services,
        report.parts
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::testing;

    #[test]
    fn seed_serials_are_stable_and_distinct() {
        assert_eq!(seed_serial("HP F2G76A"), "SEED-HP-F2G76A");
        let mut serials: Vec<String> = PARTS.iter().map(|p| seed_serial(p.model)).collect();
        serials.sort();
        serials.dedup();
        assert_eq!(serials.len(), PARTS.len());
    }

    #[test]
    fn seeded_stock_starts_at_or_above_its_minimum() {
        for part in PARTS {
            assert!(part.quantity >= part.minimum_stock, "{}", part.name);
            assert!(part.price > 0);
        }
        for service in CATALOG.iter().flat_map(|c| c.services) {
            assert!(service.minutes > 0);
            assert!(service.details.iter().all(|(_, price, _)| *price > 0));
        }
    }

    #[tokio::test]
    async fn seeding_twice_creates_nothing_new() {
        let Some(db) = testing::database().await else { return };

        run(&db).await.unwrap();
        let second = run(&db).await.unwrap();
        assert!(second.is_empty(), "{second:?}");

        let screens: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM detailed_services d
            JOIN services s ON s.id = d.service_id
            WHERE s.name = 'Screen Replacement'
            "#,
        )
        .fetch_one(&db)
        .await
        .unwrap();
        assert!(screens >= 2);
    }
}
