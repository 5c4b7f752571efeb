pub mod block_status;
pub mod calculator;
pub mod expenses;
pub mod granite;
pub mod receivables;
pub mod rows;
pub mod sales;
