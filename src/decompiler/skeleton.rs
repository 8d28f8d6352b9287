use crate::archive::VirtualNode;
use crate::decompiler::class_file::*;
use crate::decompiler::Decompiler;
use crate::error::DecompileError;
use std::fmt::Write;
use tracing::debug;

const STUB_BODY: &str = "throw new UnsupportedOperationException(\"decompiled stub\");";

#[derive(Debug, Clone)]
pub struct SkeletonOptions {
    pub include_private: bool,
    pub header_comment: bool,
}

impl Default for SkeletonOptions {
    fn default() -> Self {
        Self {
            include_private: true,
            header_comment: true,
        }
    }
}

/// Built-in backend that reads class files in process and renders their declarations.
///
/// Method bodies are not reconstructed; every concrete method throws. Class files that
/// cannot be represented as a top-level source file come back as `CannotDecompile`.
#[derive(Debug, Clone, Default)]
pub struct SkeletonDecompiler {
    options: SkeletonOptions,
}

impl SkeletonDecompiler {
    pub fn new(options: SkeletonOptions) -> Self {
        Self { options }
    }

    pub fn render(&self, bytes: &[u8]) -> Result<String, ClassFormatError> {
        let class = ClassFile::parse(bytes)?;

        if class.has_flag(ACC_MODULE) {
            return Err(ClassFormatError::Unsupported("module descriptor".to_string()));
        }
        if class.has_flag(ACC_SYNTHETIC) {
            return Err(ClassFormatError::Unsupported(format!(
                "synthetic class {}",
                class.this_class
            )));
        }

        let mut out = String::new();
        self.render_class(&class, &mut out)?;
        Ok(out)
    }

    fn render_class(&self, class: &ClassFile, out: &mut String) -> Result<(), ClassFormatError> {
        if self.options.header_comment {
            let _ = writeln!(
                out,
                "// Decompiled skeleton of {} (class file version {}.{})",
                class.this_class, class.major_version, class.minor_version
            );
            if let Some(source_file) = &class.source_file {
                let _ = writeln!(out, "// Source file: {}", source_file);
            }
            out.push('\n');
        }

        if let Some(package) = class.package_name() {
            let _ = writeln!(out, "package {};\n", package);
        }

        let kind = ClassKind::of(class);
        let mut header = String::new();
        if class.has_flag(ACC_PUBLIC) {
            header.push_str("public ");
        }
        match kind {
            ClassKind::Class => {
                if class.has_flag(ACC_ABSTRACT) {
                    header.push_str("abstract ");
                }
                if class.has_flag(ACC_FINAL) {
                    header.push_str("final ");
                }
                header.push_str("class ");
            }
            ClassKind::Interface => header.push_str("interface "),
            ClassKind::Annotation => header.push_str("@interface "),
            ClassKind::Enum => header.push_str("enum "),
        }
        header.push_str(class.simple_name());

        if kind == ClassKind::Class {
            if let Some(super_class) = class
                .super_class
                .as_deref()
                .filter(|s| !matches!(*s, "java/lang/Object" | "java/lang/Record"))
            {
                let _ = write!(header, " extends {}", java_type_name(super_class));
            }
        }

        let interfaces: Vec<String> = class
            .interfaces
            .iter()
            .filter(|i| !(kind == ClassKind::Annotation && *i == "java/lang/annotation/Annotation"))
            .map(|i| java_type_name(i))
            .collect();
        if !interfaces.is_empty() {
            let keyword = if kind.is_interface_like() { "extends" } else { "implements" };
            let _ = write!(header, " {} {}", keyword, interfaces.join(", "));
        }

        let _ = writeln!(out, "{} {{", header);

        if kind == ClassKind::Enum {
            let constants: Vec<&str> = class
                .fields
                .iter()
                .filter(|f| f.has_flag(ACC_ENUM))
                .map(|f| f.name.as_str())
                .collect();
            let _ = writeln!(out, "\n    {};", constants.join(",\n    "));
        }

        for field in class.fields.iter().filter(|f| self.wants_field(f, kind)) {
            out.push('\n');
            self.render_field(field, out)?;
        }

        for method in class.methods.iter().filter(|m| self.wants_method(m, kind)) {
            out.push('\n');
            self.render_method(class, kind, method, out)?;
        }

        out.push_str("}\n");
        Ok(())
    }

    fn wants_field(&self, field: &MemberInfo, kind: ClassKind) -> bool {
        if field.has_flag(ACC_SYNTHETIC) {
            return false;
        }
        if kind == ClassKind::Enum && field.has_flag(ACC_ENUM) {
            return false;
        }
        self.options.include_private || !field.has_flag(ACC_PRIVATE)
    }

    fn wants_method(&self, method: &MemberInfo, kind: ClassKind) -> bool {
        if method.has_flag(ACC_SYNTHETIC) || method.has_flag(ACC_BRIDGE) {
            return false;
        }
        if method.name == "<clinit>" {
            return false;
        }
        if kind == ClassKind::Enum
            && ((method.name == "values" && method.descriptor.starts_with("()"))
                || (method.name == "valueOf" && method.descriptor.starts_with("(Ljava/lang/String;)")))
        {
            return false;
        }
        self.options.include_private || !method.has_flag(ACC_PRIVATE)
    }

    fn render_field(&self, field: &MemberInfo, out: &mut String) -> Result<(), ClassFormatError> {
        let (field_type, rest) = parse_field_type(&field.descriptor)?;
        if !rest.is_empty() || field_type == "void" {
            return Err(ClassFormatError::InvalidDescriptor(field.descriptor.clone()));
        }

        let mut modifiers = visibility(field.access_flags).to_string();
        for (flag, word) in [
            (ACC_STATIC, "static "),
            (ACC_FINAL, "final "),
            (ACC_VOLATILE, "volatile "),
            (ACC_TRANSIENT, "transient "),
        ] {
            if field.has_flag(flag) {
                modifiers.push_str(word);
            }
        }

        let _ = write!(out, "    {}{} {}", modifiers, field_type, field.name);
        if let Some(value) = &field.constant_value {
            let _ = write!(out, " = {}", render_constant(value, &field_type));
        }
        out.push_str(";\n");
        Ok(())
    }

    fn render_method(
        &self,
        class: &ClassFile,
        kind: ClassKind,
        method: &MemberInfo,
        out: &mut String,
    ) -> Result<(), ClassFormatError> {
        let (mut parameters, return_type) = parse_method_descriptor(&method.descriptor)?;
        let is_constructor = method.name == "<init>";
        if is_constructor && kind == ClassKind::Enum && parameters.len() >= 2 {
            // Name and ordinal are added by javac.
            parameters.drain(..2);
        }

        let is_abstract = method.has_flag(ACC_ABSTRACT);
        let is_native = method.has_flag(ACC_NATIVE);
        let mut modifiers = String::new();
        if kind.is_interface_like() {
            if method.has_flag(ACC_PRIVATE) {
                modifiers.push_str("private ");
            }
            if method.has_flag(ACC_STATIC) {
                modifiers.push_str("static ");
            } else if !is_abstract && !method.has_flag(ACC_PRIVATE) {
                modifiers.push_str("default ");
            }
        } else {
            modifiers.push_str(visibility(method.access_flags));
            for (flag, word) in [
                (ACC_ABSTRACT, "abstract "),
                (ACC_STATIC, "static "),
                (ACC_FINAL, "final "),
                (ACC_SYNCHRONIZED, "synchronized "),
                (ACC_NATIVE, "native "),
            ] {
                if method.has_flag(flag) {
                    modifiers.push_str(word);
                }
            }
        }

        let parameter_list = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} arg{}", p, i))
            .collect::<Vec<_>>()
            .join(", ");

        let signature = if is_constructor {
            format!("{}{}({})", modifiers, class.simple_name(), parameter_list)
        } else {
            format!("{}{} {}({})", modifiers, return_type, method.name, parameter_list)
        };
        let _ = write!(out, "    {}", signature);

        if !method.exceptions.is_empty() {
            let thrown: Vec<String> = method.exceptions.iter().map(|e| java_type_name(e)).collect();
            let _ = write!(out, " throws {}", thrown.join(", "));
        }

        if is_abstract || is_native {
            out.push_str(";\n");
        } else {
            let _ = writeln!(out, " {{\n        {}\n    }}", STUB_BODY);
        }
        Ok(())
    }
}

impl Decompiler for SkeletonDecompiler {
    fn name(&self) -> &'static str {
        "skeleton"
    }

    fn decompile(&mut self, unit: &VirtualNode) -> Result<String, DecompileError> {
        debug!("#decompile({})", unit.path());
        let bytes = unit.read_bytes().map_err(|source| DecompileError::Io {
            unit: unit.name().to_string(),
            source,
        })?;

        self.render(&bytes)
            .map_err(|e| DecompileError::CannotDecompile {
                unit: unit.name().to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    Class,
    Interface,
    Annotation,
    Enum,
}

impl ClassKind {
    fn of(class: &ClassFile) -> Self {
        if class.has_flag(ACC_ANNOTATION) {
            ClassKind::Annotation
        } else if class.has_flag(ACC_INTERFACE) {
            ClassKind::Interface
        } else if class.has_flag(ACC_ENUM) {
            ClassKind::Enum
        } else {
            ClassKind::Class
        }
    }

    fn is_interface_like(self) -> bool {
        matches!(self, ClassKind::Interface | ClassKind::Annotation)
    }
}

fn visibility(flags: u16) -> &'static str {
    if flags & ACC_PUBLIC != 0 {
        "public "
    } else if flags & ACC_PROTECTED != 0 {
        "protected "
    } else if flags & ACC_PRIVATE != 0 {
        "private "
    } else {
        ""
    }
}

fn render_constant(value: &ConstantValue, field_type: &str) -> String {
    match value {
        ConstantValue::Int(v) => match field_type {
            "boolean" => (*v != 0).to_string(),
            "char" => match char::from_u32(*v as u32) {
                Some(c) if !c.is_control() && c != '\'' && c != '\\' => format!("'{}'", c),
                _ => format!("(char) {}", v),
            },
            "byte" => format!("(byte) {}", v),
            "short" => format!("(short) {}", v),
            _ => v.to_string(),
        },
        ConstantValue::Long(v) => format!("{}L", v),
        ConstantValue::Float(v) => {
            if v.is_nan() {
                "Float.NaN".to_string()
            } else if v.is_infinite() {
                let name = if *v > 0.0 { "POSITIVE_INFINITY" } else { "NEGATIVE_INFINITY" };
                format!("Float.{}", name)
            } else {
                format!("{:?}f", v)
            }
        }
        ConstantValue::Double(v) => {
            if v.is_nan() {
                "Double.NaN".to_string()
            } else if v.is_infinite() {
                let name = if *v > 0.0 { "POSITIVE_INFINITY" } else { "NEGATIVE_INFINITY" };
                format!("Double.{}", name)
            } else {
                format!("{:?}", v)
            }
        }
        ConstantValue::String(s) => format!("\"{}\"", escape_java_string(s)),
    }
}

fn escape_java_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(escaped, "\\u{:04x}", c as u32);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompiler::class_file::tests::ClassBuilder;

    fn unit(name: &str, bytes: Vec<u8>) -> VirtualNode {
        VirtualNode::file(name, format!("lib.jar!/com/acme/{}", name), bytes)
    }

    #[test]
    fn test_renders_class_declaration() {
        let bytes = ClassBuilder::new("com/acme/Foo")
            .extends("com/acme/Base")
            .implements("java/lang/Runnable")
            .int_constant(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "LIMIT", 42)
            .field(ACC_PRIVATE, "name", "Ljava/lang/String;")
            .method(ACC_PUBLIC, "<init>", "(Ljava/lang/String;)V")
            .method(ACC_STATIC, "<clinit>", "()V")
            .method_throws(ACC_PUBLIC, "run", "()V", &["java/io/IOException"])
            .method(ACC_PUBLIC | ACC_SYNTHETIC | ACC_BRIDGE, "access$000", "()V")
            .build();

        let source = SkeletonDecompiler::default().render(&bytes).unwrap();

        assert!(source.contains("package com.acme;"));
        assert!(source.contains("public class Foo extends com.acme.Base implements Runnable {"));
        assert!(source.contains("    public static final int LIMIT = 42;"));
        assert!(source.contains("    private String name;"));
        assert!(source.contains("    public Foo(String arg0) {"));
        assert!(source.contains("    public void run() throws java.io.IOException {"));
        assert!(source.contains(STUB_BODY));
        assert!(!source.contains("<clinit>"));
        assert!(!source.contains("access$000"));
        assert!(source.trim_end().ends_with('}'));
    }

    #[test]
    fn test_private_members_can_be_hidden() {
        let bytes = ClassBuilder::new("Secret")
            .field(ACC_PRIVATE, "hidden", "I")
            .method(ACC_PRIVATE, "helper", "()V")
            .method(ACC_PUBLIC, "visible", "()V")
            .build();

        let decompiler = SkeletonDecompiler::new(SkeletonOptions {
            include_private: false,
            header_comment: false,
        });
        let source = decompiler.render(&bytes).unwrap();

        assert!(!source.contains("hidden"));
        assert!(!source.contains("helper"));
        assert!(source.contains("public void visible()"));
        assert!(source.starts_with("public class Secret {"));
    }

    #[test]
    fn test_renders_interface_and_enum() {
        let interface = ClassBuilder::new("com/acme/Shape")
            .access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT)
            .implements("java/lang/Comparable")
            .method(ACC_PUBLIC | ACC_ABSTRACT, "area", "()D")
            .method(ACC_PUBLIC, "describe", "()Ljava/lang/String;")
            .build();
        let source = SkeletonDecompiler::default().render(&interface).unwrap();
        assert!(source.contains("public interface Shape extends Comparable {"));
        assert!(source.contains("    double area();"));
        assert!(source.contains("    default String describe() {"));

        let enumeration = ClassBuilder::new("com/acme/Color")
            .access(ACC_PUBLIC | ACC_FINAL | ACC_ENUM)
            .extends("java/lang/Enum")
            .field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM, "RED", "Lcom/acme/Color;")
            .field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM, "GREEN", "Lcom/acme/Color;")
            .field(ACC_PRIVATE | ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC, "$VALUES", "[Lcom/acme/Color;")
            .method(ACC_PUBLIC | ACC_STATIC, "values", "()[Lcom/acme/Color;")
            .method(ACC_PUBLIC | ACC_STATIC, "valueOf", "(Ljava/lang/String;)Lcom/acme/Color;")
            .method(ACC_PRIVATE, "<init>", "(Ljava/lang/String;I)V")
            .build();
        let source = SkeletonDecompiler::default().render(&enumeration).unwrap();
        assert!(source.contains("public enum Color {"));
        assert!(source.contains("    RED,\n    GREEN;"));
        assert!(source.contains("    private Color() {"));
        assert!(!source.contains("$VALUES"));
        assert!(!source.contains("valueOf"));
    }

    #[test]
    fn test_synthetic_class_cannot_be_decompiled() {
        let bytes = ClassBuilder::new("com/acme/Generated")
            .access(ACC_PUBLIC | ACC_SYNTHETIC)
            .build();

        let mut decompiler = SkeletonDecompiler::default();
        let error = decompiler
            .decompile(&unit("Generated.class", bytes))
            .unwrap_err();
        assert!(matches!(error, DecompileError::CannotDecompile { ref unit, .. } if unit == "Generated.class"));
    }

    #[test]
    fn test_deeply_nested_array_descriptor_cannot_be_decompiled() {
        let descriptor = format!("{}I", "[".repeat(60000));
        let bytes = ClassBuilder::new("com/acme/Deep")
            .field(ACC_PUBLIC, "x", &descriptor)
            .build();

        let mut decompiler = SkeletonDecompiler::default();
        let error = decompiler
            .decompile(&unit("Deep.class", bytes))
            .unwrap_err();
        assert!(matches!(error, DecompileError::CannotDecompile { ref unit, .. } if unit == "Deep.class"));
    }

    #[test]
    fn test_garbage_bytes_cannot_be_decompiled() {
        let mut decompiler = SkeletonDecompiler::default();
        let error = decompiler
            .decompile(&unit("Bar.class", b"not a class".to_vec()))
            .unwrap_err();
        assert!(matches!(error, DecompileError::CannotDecompile { .. }));
    }

    #[test]
    fn test_output_is_deterministic() {
        let bytes = ClassBuilder::new("com/acme/Foo")
            .method(ACC_PUBLIC, "go", "(IJ)Z")
            .build();
        let mut decompiler = SkeletonDecompiler::default();
        let first = decompiler.decompile(&unit("Foo.class", bytes.clone())).unwrap();
        let second = decompiler.decompile(&unit("Foo.class", bytes)).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("public boolean go(int arg0, long arg1) {"));
    }

    #[test]
    fn test_constant_rendering() {
        assert_eq!(render_constant(&ConstantValue::Int(1), "boolean"), "true");
        assert_eq!(render_constant(&ConstantValue::Int(65), "char"), "'A'");
        assert_eq!(render_constant(&ConstantValue::Long(7), "long"), "7L");
        assert_eq!(render_constant(&ConstantValue::Float(1.5), "float"), "1.5f");
        assert_eq!(render_constant(&ConstantValue::Double(f64::NAN), "double"), "Double.NaN");
        assert_eq!(
            render_constant(&ConstantValue::String("say \"hi\"\n".to_string()), "String"),
            "\"say \\\"hi\\\"\\n\""
        );
    }
}
