//! Hand-assembled entity classes for tests.

use crate::classfile::access::{ACC_PRIVATE, ACC_PUBLIC, ACC_SUPER};
use crate::classfile::{ClassFile, JavaType};
use crate::emit::{ClassBuilder, FieldSpec, MethodBuilder, Opcode};

pub(crate) struct EntityClass {
    name: String,
    super_name: String,
    major: u16,
    interfaces: Vec<String>,
    signature: Option<String>,
    fields: Vec<(String, String)>,
    methods: Vec<MethodBuilder>,
}

impl EntityClass {
    pub fn new(name: &str, super_name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: super_name.to_string(),
            major: 52,
            interfaces: Vec::new(),
            signature: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Private field with a plain `getX`/`setX` pair.
    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((name.to_string(), descriptor.to_string()));
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn major(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut class =
            ClassFile::new(&self.name, Some(&self.super_name), ACC_PUBLIC | ACC_SUPER, self.major)
                .unwrap();
        for interface in &self.interfaces {
            class.add_interface(interface).unwrap();
        }
        if let Some(signature) = &self.signature {
            class.set_signature(signature).unwrap();
        }

        let mut builder = ClassBuilder::new(class).unwrap();
        let mut ctor = MethodBuilder::new(ACC_PUBLIC, "<init>", "()V");
        ctor.aload(0)
            .invoke_special(&self.super_name, "<init>", "()V")
            .op(Opcode::Return);
        builder.add_method(ctor).unwrap();

        for (field, descriptor) in &self.fields {
            let ty = JavaType::from_descriptor(descriptor).unwrap();
            builder
                .add_field(FieldSpec::new(ACC_PRIVATE, field.as_str(), descriptor.as_str()))
                .unwrap();
            let suffix = capitalize(field);

            let mut get = MethodBuilder::new(ACC_PUBLIC, format!("get{suffix}"), format!("(){descriptor}"));
            get.aload(0).get_field(&self.name, field, descriptor).ret(&ty);
            builder.add_method(get).unwrap();

            let mut set = MethodBuilder::new(ACC_PUBLIC, format!("set{suffix}"), format!("({descriptor})V"));
            set.aload(0)
                .load(&ty, 1)
                .put_field(&self.name, field, descriptor)
                .op(Opcode::Return);
            builder.add_method(set).unwrap();
        }
        for method in self.methods {
            builder.add_method(method).unwrap();
        }
        builder.finish().0.to_bytes()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn employee_class() -> Vec<u8> {
    EntityClass::new("com/acme/Employee", "java/lang/Object")
        .field("manager", "Lcom/acme/Employee;")
        .field("salary", "I")
        .build()
}

pub(crate) fn manager_class() -> Vec<u8> {
    EntityClass::new("com/acme/Manager", "com/acme/Employee")
        .field("reports", "Ljava/util/List;")
        .build()
}
