//! 数据访问层
//!
//! 仓储遵循统一约定：实例方法走连接池做读查询；
//! 关联函数 `*_in_tx` / `*_for_update` 接收 `&mut PgConnection`，
//! 由服务层在单个事务内编排。

pub mod order_repo;
pub mod payment_repo;
pub mod voucher_repo;

pub use order_repo::OrderRepository;
pub use payment_repo::PaymentRepository;
pub use voucher_repo::VoucherUsageRepository;
