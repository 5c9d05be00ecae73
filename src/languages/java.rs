use once_cell::sync::OnceCell;
use tree_sitter::Query;

use super::LanguageGrammar;

pub struct JavaGrammar;

static JAVA_METHODS_QUERY: OnceCell<Query> = OnceCell::new();
static JAVA_TYPES_QUERY: OnceCell<Query> = OnceCell::new();
static JAVA_IMPORTS_QUERY: OnceCell<Query> = OnceCell::new();

impl LanguageGrammar for JavaGrammar {
    fn name(&self) -> &'static str {
        "java"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["java"]
    }

    fn language(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn methods_query(&self) -> &str {
        r#"
        (method_declaration
            name: (identifier) @name
            parameters: (formal_parameters) @params
            body: (block) @body
        ) @method

        (constructor_declaration
            name: (identifier) @name
            parameters: (formal_parameters) @params
            body: (constructor_body) @body
        ) @constructor
        "#
    }

    fn types_query(&self) -> &str {
        r#"
        (class_declaration
            name: (identifier) @name
        ) @class

        (interface_declaration
            name: (identifier) @name
        ) @interface

        (enum_declaration
            name: (identifier) @name
        ) @enum

        (record_declaration
            name: (identifier) @name
        ) @record

        (annotation_type_declaration
            name: (identifier) @name
        ) @annotation
        "#
    }

    fn imports_query(&self) -> &str {
        r#"
        (import_declaration) @import

        (package_declaration
            [(scoped_identifier) (identifier)] @package_path
        ) @package
        "#
    }

    fn cached_methods_query(&self) -> Option<&'static Query> {
        JAVA_METHODS_QUERY
            .get_or_try_init(|| Query::new(&self.language(), self.methods_query()))
            .ok()
    }

    fn cached_types_query(&self) -> Option<&'static Query> {
        JAVA_TYPES_QUERY
            .get_or_try_init(|| Query::new(&self.language(), self.types_query()))
            .ok()
    }

    fn cached_imports_query(&self) -> Option<&'static Query> {
        JAVA_IMPORTS_QUERY
            .get_or_try_init(|| Query::new(&self.language(), self.imports_query()))
            .ok()
    }

    fn feature_levels(&self) -> &[(&'static str, &'static str, u32)] {
        &[
            ("lambda_expression", "lambda expression", 8),
            ("method_reference", "method reference", 8),
            ("record_declaration", "record declaration", 16),
        ]
    }

    fn platform_packages(&self) -> &[&'static str] {
        &[
            "java.",
            "javax.",
            "jdk.",
            "sun.",
            "com.sun.",
            "org.w3c.dom",
            "org.xml.sax",
        ]
    }
}
