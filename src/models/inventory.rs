use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "device_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Laptop,
    Desktop,
    Printer,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Laptop => "laptop",
            DeviceType::Desktop => "desktop",
            DeviceType::Printer => "printer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "repair_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Completed,
    Returned,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sale_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    New,
    Sold,
    Refurbished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "part_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    InStock,
    OutOfStock,
    Used,
    Defective,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movement_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Repair,
    Sale,
    Restock,
    RepairReversal,
}

impl MovementType {
    /// Signed change a movement of `quantity` units applies to the part's stock.
    pub fn delta(self, quantity: i32) -> i32 {
        match self {
            MovementType::Repair | MovementType::Sale => -quantity,
            MovementType::Restock | MovementType::RepairReversal => quantity,
        }
    }

    pub fn consumes_stock(self) -> bool {
        self.delta(1) < 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: i64,
    pub owner_id: Option<Uuid>,
    pub device_type: DeviceType,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub repair_status: Option<RepairStatus>,
    pub sale_status: Option<SaleStatus>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DevicePart {
    pub id: i64,
    /// Set when the part belongs to a customer's device rather than shop stock.
    pub device_id: Option<i64>,
    pub name: String,
    pub model: String,
    pub serial_number: String,
    pub price: Option<rust_decimal::Decimal>,
    pub quantity: i32,
    pub status: Option<PartStatus>,
    pub warranty_months: i32,
    pub minimum_stock: i32,
    pub created_at: DateTime<Utc>,
}

/// Derived label for a part's stock; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
    CustomerOwned,
}

impl StockStatus {
    pub fn label(self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out of stock",
            StockStatus::LowStock => "low stock",
            StockStatus::InStock => "in stock",
            StockStatus::CustomerOwned => "customer-owned part",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StockError {
    #[error("not enough stock for {name}: available {available}, requested {requested}")]
    Insufficient {
        name: String,
        available: i32,
        requested: i32,
    },

    #[error("quantity must be greater than zero")]
    NonPositive,

    #[error("requested quantity of part {part_id} is too large")]
    TooLarge { part_id: i64 },
}

impl DevicePart {
    pub fn is_shop_owned(&self) -> bool {
        self.device_id.is_none()
    }

    pub fn stock_status(&self) -> StockStatus {
        if !self.is_shop_owned() {
            StockStatus::CustomerOwned
        } else if self.quantity <= 0 {
            StockStatus::OutOfStock
        } else if self.quantity < self.minimum_stock {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// Quantity left after consuming `requested` units, or why that is impossible.
    /// Stock never goes below zero.
    pub fn remaining_after(&self, requested: i32) -> Result<i32, StockError> {
        if requested <= 0 {
            return Err(StockError::NonPositive);
        }
        if requested > self.quantity {
            return Err(StockError::Insufficient {
                name: self.name.clone(),
                available: self.quantity,
                requested,
            });
        }
        Ok(self.quantity - requested)
    }

    pub fn unit_price(&self) -> rust_decimal::Decimal {
        self.price.unwrap_or_default()
    }
}

/// Part as returned by the API, with its derived stock status.
#[derive(Debug, Serialize)]
pub struct DevicePartView {
    #[serde(flatten)]
    pub part: DevicePart,
    pub stock_status: StockStatus,
    pub stock_label: &'static str,
}

impl From<DevicePart> for DevicePartView {
    fn from(part: DevicePart) -> Self {
        let stock_status = part.stock_status();
        Self {
            part,
            stock_status,
            stock_label: stock_status.label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PartMovement {
    pub id: i64,
    pub part_id: i64,
    /// Signed stock delta.
    pub quantity: i32,
    pub movement_type: MovementType,
    pub notes: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RepairHistory {
    pub id: i64,
    pub device_id: i64,
    pub booking_id: Option<i64>,
    pub technician_id: Option<i64>,
    pub diagnosis: String,
    pub repair_date: DateTime<Utc>,
    pub parts_replaced: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(quantity: i32, minimum_stock: i32, device_id: Option<i64>) -> DevicePart {
        DevicePart {
            id: 1,
            device_id,
            name: "16GB DDR4 RAM".to_string(),
            model: "Kingston".to_string(),
            serial_number: "RAM-001".to_string(),
            price: Some(rust_decimal::Decimal::new(450000, 2)),
            quantity,
            status: None,
            warranty_months: 6,
            minimum_stock,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stock_status_thresholds() {
        assert_eq!(part(0, 2, None).stock_status(), StockStatus::OutOfStock);
        assert_eq!(part(1, 2, None).stock_status(), StockStatus::LowStock);
        assert_eq!(part(2, 2, None).stock_status(), StockStatus::InStock);
        assert_eq!(part(9, 2, None).stock_status(), StockStatus::InStock);
    }

    #[test]
    fn device_bound_part_is_always_customer_owned() {
        assert_eq!(part(0, 5, Some(3)).stock_status(), StockStatus::CustomerOwned);
        assert_eq!(part(1, 0, Some(3)).stock_status(), StockStatus::CustomerOwned);
    }

    #[test]
    fn consuming_more_than_stock_is_rejected() {
        let shelf = part(2, 1, None);
        assert_eq!(
            shelf.remaining_after(3),
            Err(StockError::Insufficient {
                name: "16GB DDR4 RAM".to_string(),
                available: 2,
                requested: 3,
            })
        );
        assert_eq!(shelf.remaining_after(0), Err(StockError::NonPositive));
    }

    #[test]
    fn consuming_all_stock_leaves_part_out_of_stock() {
        let mut shelf = part(2, 1, None);
        shelf.quantity = shelf.remaining_after(2).unwrap();
        assert_eq!(shelf.quantity, 0);
        assert_eq!(shelf.stock_status().label(), "out of stock");
    }

    #[test]
    fn movement_deltas_are_signed() {
        assert_eq!(MovementType::Repair.delta(3), -3);
        assert_eq!(MovementType::Sale.delta(1), -1);
        assert_eq!(MovementType::Restock.delta(4), 4);
        assert_eq!(MovementType::RepairReversal.delta(2), 2);
        assert!(MovementType::Sale.consumes_stock());
        assert!(!MovementType::Restock.consumes_stock());
    }
}
