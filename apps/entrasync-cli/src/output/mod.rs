//! Terminal output helpers

mod printer;

pub use printer::{
    print_count, print_header, print_info, print_json, print_key_value, print_success,
    print_warning,
};
