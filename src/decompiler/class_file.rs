//! Reader for the JVM class-file format.
//!
//! Only the parts needed to reconstruct declarations are decoded: the constant pool, class
//! header, fields, methods, and the `SourceFile`, `ConstantValue` and `Exceptions`
//! attributes. Everything else is skipped by length.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Cursor};
use thiserror::Error;

pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_MODULE: u16 = 0x8000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("bad magic number 0x{0:08X}")]
    BadMagic(u32),

    #[error("class file is truncated")]
    Truncated,

    #[error("constant pool index {0} is out of range")]
    InvalidConstantIndex(u16),

    #[error("constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },

    #[error("unknown constant pool tag {0}")]
    UnknownConstantTag(u8),

    #[error("malformed descriptor {0:?}")]
    InvalidDescriptor(String),

    #[error("unsupported class: {0}")]
    Unsupported(String),
}

impl From<io::Error> for ClassFormatError {
    fn from(_: io::Error) -> Self {
        ClassFormatError::Truncated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    /// Member refs, name-and-type, method handles, dynamic constants, module and package
    /// entries: never needed for declarations.
    Other,
    /// Second slot of a long or double.
    Unusable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub constant_value: Option<ConstantValue>,
    pub exceptions: Vec<String>,
}

impl MemberInfo {
    pub fn has_flag(&self, flag: u16) -> bool {
        self.access_flags & flag != 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, e.g. `com/acme/Foo`.
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub source_file: Option<String>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFormatError> {
        let mut reader = ClassReader {
            cursor: Cursor::new(bytes),
            pool: Vec::new(),
        };
        reader.read_class()
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.access_flags & flag != 0
    }

    pub fn package_name(&self) -> Option<String> {
        self.this_class
            .rfind('/')
            .map(|pos| self.this_class[..pos].replace('/', "."))
    }

    /// Unqualified name, e.g. `Foo` for `com/acme/Foo` and `Inner` for `com/acme/Outer$Inner`.
    pub fn simple_name(&self) -> &str {
        let start = self.this_class.rfind('/').map(|p| p + 1).unwrap_or(0);
        let name = &self.this_class[start..];
        match name.rfind('$') {
            Some(pos) => &name[pos + 1..],
            None => name,
        }
    }
}

struct ClassReader<'a> {
    cursor: Cursor<&'a [u8]>,
    pool: Vec<Constant>,
}

impl ClassReader<'_> {
    fn read_class(&mut self) -> Result<ClassFile, ClassFormatError> {
        let magic = self.u32()?;
        if magic != CLASS_MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = self.u16()?;
        let major_version = self.u16()?;

        self.read_constant_pool()?;

        let access_flags = self.u16()?;
        let this_index = self.u16()?;
        let this_class = self.class_name(this_index)?;
        let super_index = self.u16()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(self.class_name(super_index)?)
        };

        let interface_count = self.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            let index = self.u16()?;
            interfaces.push(self.class_name(index)?);
        }

        let fields = self.read_members()?;
        let methods = self.read_members()?;

        let mut source_file = None;
        let attribute_count = self.u16()?;
        for _ in 0..attribute_count {
            let name_index = self.u16()?;
            let name = self.utf8(name_index)?.to_string();
            let length = self.u32()?;
            if name == "SourceFile" && length == 2 {
                let value_index = self.u16()?;
                source_file = Some(self.utf8(value_index)?.to_string());
            } else {
                self.skip(length)?;
            }
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            source_file,
        })
    }

    fn read_constant_pool(&mut self) -> Result<(), ClassFormatError> {
        let count = self.u16()?;
        self.pool = Vec::with_capacity(count as usize);
        // Index 0 is never valid.
        self.pool.push(Constant::Unusable);

        while self.pool.len() < count as usize {
            let tag = self.u8()?;
            let constant = match tag {
                1 => {
                    let length = self.u16()? as usize;
                    let bytes = self.take(length)?;
                    Constant::Utf8(String::from_utf8_lossy(bytes).into_owned())
                }
                3 => Constant::Integer(self.cursor.read_i32::<BigEndian>()?),
                4 => Constant::Float(self.cursor.read_f32::<BigEndian>()?),
                5 => Constant::Long(self.cursor.read_i64::<BigEndian>()?),
                6 => Constant::Double(self.cursor.read_f64::<BigEndian>()?),
                7 => Constant::Class(self.u16()?),
                8 => Constant::String(self.u16()?),
                9..=12 | 17 | 18 => {
                    self.skip(4)?;
                    Constant::Other
                }
                15 => {
                    self.skip(3)?;
                    Constant::Other
                }
                16 | 19 | 20 => {
                    self.skip(2)?;
                    Constant::Other
                }
                other => return Err(ClassFormatError::UnknownConstantTag(other)),
            };

            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            self.pool.push(constant);
            if wide {
                self.pool.push(Constant::Unusable);
            }
        }

        Ok(())
    }

    fn read_members(&mut self) -> Result<Vec<MemberInfo>, ClassFormatError> {
        let count = self.u16()?;
        let mut members = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let access_flags = self.u16()?;
            let name_index = self.u16()?;
            let name = self.utf8(name_index)?.to_string();
            let descriptor_index = self.u16()?;
            let descriptor = self.utf8(descriptor_index)?.to_string();
            let mut constant_value = None;
            let mut exceptions = Vec::new();

            let attribute_count = self.u16()?;
            for _ in 0..attribute_count {
                let attribute_index = self.u16()?;
                let attribute = self.utf8(attribute_index)?.to_string();
                let length = self.u32()?;
                match attribute.as_str() {
                    "ConstantValue" if length == 2 => {
                        let index = self.u16()?;
                        constant_value = Some(self.constant_value(index)?);
                    }
                    "Exceptions" => {
                        let start = self.cursor.position();
                        let number = self.u16()?;
                        for _ in 0..number {
                            let index = self.u16()?;
                            exceptions.push(self.class_name(index)?);
                        }
                        let consumed = self.cursor.position() - start;
                        if consumed > u64::from(length) {
                            return Err(ClassFormatError::Truncated);
                        }
                        self.skip(length - consumed as u32)?;
                    }
                    _ => self.skip(length)?,
                }
            }

            members.push(MemberInfo {
                access_flags,
                name,
                descriptor,
                constant_value,
                exceptions,
            });
        }

        Ok(members)
    }

    fn constant(&self, index: u16) -> Result<&Constant, ClassFormatError> {
        self.pool
            .get(index as usize)
            .filter(|_| index != 0)
            .ok_or(ClassFormatError::InvalidConstantIndex(index))
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.constant(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(ClassFormatError::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.constant(index)? {
            Constant::Class(name_index) => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassFormatError::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }

    fn constant_value(&self, index: u16) -> Result<ConstantValue, ClassFormatError> {
        match self.constant(index)? {
            Constant::Integer(v) => Ok(ConstantValue::Int(*v)),
            Constant::Float(v) => Ok(ConstantValue::Float(*v)),
            Constant::Long(v) => Ok(ConstantValue::Long(*v)),
            Constant::Double(v) => Ok(ConstantValue::Double(*v)),
            Constant::String(string_index) => {
                Ok(ConstantValue::String(self.utf8(*string_index)?.to_string()))
            }
            _ => Err(ClassFormatError::UnexpectedConstant {
                index,
                expected: "constant value",
            }),
        }
    }

    fn u8(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.cursor.read_u8()?)
    }

    fn u16(&mut self) -> Result<u16, ClassFormatError> {
        Ok(self.cursor.read_u16::<BigEndian>()?)
    }

    fn u32(&mut self) -> Result<u32, ClassFormatError> {
        Ok(self.cursor.read_u32::<BigEndian>()?)
    }

    fn remaining(&self) -> u64 {
        (self.cursor.get_ref().len() as u64).saturating_sub(self.cursor.position())
    }

    fn skip(&mut self, length: u32) -> Result<(), ClassFormatError> {
        if u64::from(length) > self.remaining() {
            return Err(ClassFormatError::Truncated);
        }
        self.cursor.set_position(self.cursor.position() + u64::from(length));
        Ok(())
    }

    fn take(&mut self, length: usize) -> Result<&[u8], ClassFormatError> {
        if length as u64 > self.remaining() {
            return Err(ClassFormatError::Truncated);
        }
        let start = self.cursor.position() as usize;
        self.cursor.set_position((start + length) as u64);
        let bytes: &[u8] = self.cursor.get_ref();
        Ok(&bytes[start..start + length])
    }
}

/// Array dimension limit the JVM puts on descriptors.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Java source spelling of one field descriptor, plus the unparsed remainder.
pub fn parse_field_type(descriptor: &str) -> Result<(String, &str), ClassFormatError> {
    let invalid = || ClassFormatError::InvalidDescriptor(descriptor.to_string());
    let element = descriptor.trim_start_matches('[');
    let dimensions = descriptor.len() - element.len();
    if dimensions > MAX_ARRAY_DIMENSIONS {
        return Err(invalid());
    }

    let mut chars = element.chars();
    let first = chars.next().ok_or_else(invalid)?;
    let rest = chars.as_str();

    let (name, remainder) = match first {
        'B' => ("byte".to_string(), rest),
        'C' => ("char".to_string(), rest),
        'D' => ("double".to_string(), rest),
        'F' => ("float".to_string(), rest),
        'I' => ("int".to_string(), rest),
        'J' => ("long".to_string(), rest),
        'S' => ("short".to_string(), rest),
        'Z' => ("boolean".to_string(), rest),
        'V' if dimensions == 0 => ("void".to_string(), rest),
        'L' => {
            let end = rest.find(';').ok_or_else(invalid)?;
            if end == 0 {
                return Err(invalid());
            }
            (java_type_name(&rest[..end]), &rest[end + 1..])
        }
        _ => return Err(invalid()),
    };

    Ok((format!("{}{}", name, "[]".repeat(dimensions)), remainder))
}

/// Parameter types and return type of a method descriptor such as `(ILjava/lang/String;)V`.
pub fn parse_method_descriptor(descriptor: &str) -> Result<(Vec<String>, String), ClassFormatError> {
    let invalid = || ClassFormatError::InvalidDescriptor(descriptor.to_string());
    let mut rest = descriptor.strip_prefix('(').ok_or_else(invalid)?;
    let mut parameters = Vec::new();

    while !rest.starts_with(')') {
        if rest.is_empty() {
            return Err(invalid());
        }
        let (parameter, remainder) = parse_field_type(rest)?;
        if parameter == "void" {
            return Err(invalid());
        }
        parameters.push(parameter);
        rest = remainder;
    }

    let (return_type, remainder) = parse_field_type(&rest[1..])?;
    if !remainder.is_empty() {
        return Err(invalid());
    }
    Ok((parameters, return_type))
}

/// `java/util/Map$Entry` becomes `java.util.Map.Entry`; `java.lang` is left implicit.
pub fn java_type_name(internal_name: &str) -> String {
    let dotted = internal_name.replace(['/', '$'], ".");
    match dotted.strip_prefix("java.lang.") {
        Some(simple) if !simple.contains('.') => simple.to_string(),
        _ => dotted,
    }
}
