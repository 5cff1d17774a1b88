pub mod hk_market;
