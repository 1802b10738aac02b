//! 实体模型定义

pub mod enums;
pub mod order;
pub mod payment;
pub mod voucher;

pub use enums::{OrderStatus, PaymentStatus};
pub use order::{Order, OrderItem};
pub use payment::{Payment, PaymentEvent};
pub use voucher::VoucherUsage;
