pub mod reserves;
