mod comparison;
mod zeroize_on_drop;
