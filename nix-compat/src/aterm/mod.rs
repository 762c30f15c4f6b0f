mod escape;
mod parser;

pub(crate) use escape::escape_bytes;
pub(crate) use parser::parse_bytes_field as parse_bstr_field;
pub(crate) use parser::parse_string_field;
pub(crate) use parser::parse_string_list as parse_str_list;
