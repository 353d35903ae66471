//! Class/method name to native symbol mapping.
//!
//! Follows the managed runtime's fixed convention: `Java_` + escaped class name + `_` + escaped
//! method name, optionally followed by `__` + the escaped argument descriptor for overloads.
use std::fmt::Write;

pub const SYMBOL_PREFIX: &str = "Java_";

fn escape_into(out: &mut String, name: &str) {
    for c in name.chars() {
        match c {
            '.' | '/' => out.push('_'),
            '_' => out.push_str("_1"),
            ';' => out.push_str("_2"),
            '[' => out.push_str("_3"),
            c if c.is_ascii_alphanumeric() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    // writing to a String cannot fail
                    let _ = write!(out, "_0{:04x}", unit);
                }
            }
        }
    }
}

pub fn escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    escape_into(&mut out, name);
    out
}

/// Short symbol name, used when a native method is not overloaded.
pub fn short_name(class: &str, method: &str) -> String {
    let mut out = String::from(SYMBOL_PREFIX);
    escape_into(&mut out, class);
    out.push('_');
    escape_into(&mut out, method);
    out
}

/// Long symbol name including the argument part of a method descriptor like `(I[J)V`.
///
/// Returns `None` if `descriptor` has no parenthesised argument list.
pub fn long_name(class: &str, method: &str, descriptor: &str) -> Option<String> {
    let args = descriptor.strip_prefix('(')?;
    let args = &args[..args.find(')')?];
    let mut out = short_name(class, method);
    out.push_str("__");
    escape_into(&mut out, args);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names() {
        assert_eq!(
            short_name("MyClass", "printNativeAddress"),
            "Java_MyClass_printNativeAddress"
        );
        assert_eq!(
            short_name("compiler.jeandle.TestGetstatic", "testGetstatic"),
            "Java_compiler_jeandle_TestGetstatic_testGetstatic"
        );
        assert_eq!(
            short_name("pkg/My_Class", "get_addr"),
            "Java_pkg_My_1Class_get_1addr"
        );
    }

    #[test]
    fn test_unicode_escape() {
        assert_eq!(escape("é"), "_000e9");
        // outside the BMP: one escape per UTF-16 unit
        assert_eq!(escape("😀"), "_0d83d_0de00");
    }

    #[test]
    fn test_long_names() {
        assert_eq!(
            long_name("MyClass", "getNativeAddress", "()J").as_deref(),
            Some("Java_MyClass_getNativeAddress__")
        );
        assert_eq!(
            long_name("a.B", "f", "(I[Ljava/lang/String;)V").as_deref(),
            Some("Java_a_B_f__I_3Ljava_lang_String_2")
        );
        assert_eq!(long_name("a.B", "f", "V"), None);
    }
}
