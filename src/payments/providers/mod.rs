pub mod paystack;
