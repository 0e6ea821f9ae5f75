//! Members synthesized for each attribute a class declares: the lazy value
//! holder and its accessors, and the internal field accessors that gate,
//! synchronize and announce every read and write.

use super::names;
use super::plan::WeavePlan;
use crate::classfile::JavaType;
use crate::classfile::access::{ACC_PROTECTED, ACC_PUBLIC};
use crate::emit::{ClassBuilder, FieldSpec, MethodBuilder, Opcode};
use crate::error::WeaveError;
use crate::model::AttributeDetails;

pub(crate) fn weave_attribute(
    builder: &mut ClassBuilder,
    plan: &WeavePlan<'_>,
    attr: &AttributeDetails,
) -> Result<(), WeaveError> {
    if plan.weaves_holder(attr) {
        builder.add_field(holder_field(plan, attr))?;
        builder.add_method(holder_initializer(plan, attr))?;
        builder.add_method(holder_getter(plan, attr))?;
        builder.add_method(holder_setter(plan, attr))?;
    }
    if plan.intercepts(attr) {
        builder.add_method(field_getter(plan, attr))?;
        builder.add_method(field_setter(plan, attr))?;
    }
    Ok(())
}

fn holder_field(plan: &WeavePlan<'_>, attr: &AttributeDetails) -> FieldSpec {
    let mut field = FieldSpec::new(
        ACC_PROTECTED,
        names::holder_field(&attr.name),
        names::VALUE_HOLDER_INTERFACE_DESC,
    );
    // Annotating a property-access holder would flip the class to field access.
    if attr.getter_name().is_none() || attr.weave_transient_field_value_holders {
        for annotation in plan.transient_annotations() {
            field = field.annotated(annotation);
        }
    }
    field
}

/// Reference type of a lazy attribute, as a class operand.
fn reference(attr: &AttributeDetails) -> String {
    attr.java_type
        .class_operand()
        .unwrap_or_else(|| names::OBJECT.to_string())
}

fn load_holder(m: &mut MethodBuilder, plan: &WeavePlan<'_>, attr: &AttributeDetails) {
    m.aload(0).get_field(
        plan.class_name,
        &names::holder_field(&attr.name),
        names::VALUE_HOLDER_INTERFACE_DESC,
    );
}

fn holder_call(m: &mut MethodBuilder, name: &str, descriptor: &str) {
    m.invoke_interface(names::VALUE_HOLDER_INTERFACE, name, descriptor);
}

/// `this.<a> = (Ref) this.<a>_vh.getValue()` after making sure the holder
/// exists.
fn sync_from_holder(m: &mut MethodBuilder, plan: &WeavePlan<'_>, attr: &AttributeDetails) {
    m.aload(0)
        .invoke_virtual(plan.class_name, &names::holder_initializer(&attr.name), "()V")
        .aload(0);
    load_holder(m, plan, attr);
    holder_call(m, "getValue", "()Ljava/lang/Object;");
    m.checkcast(&reference(attr))
        .put_field(plan.class_name, &attr.name, &attr.descriptor());
}

/// Pushes the attribute's value through its user getter, or the internal one.
fn call_getter(m: &mut MethodBuilder, plan: &WeavePlan<'_>, attr: &AttributeDetails) {
    let target = reference(attr);
    m.aload(0);
    match attr.getter_name() {
        Some(getter) if attr.uses_keyed_accessors() => {
            m.ldc(&attr.name)
                .invoke_virtual(plan.class_name, getter, names::VIRTUAL_GETTER_DESC)
                .checkcast(&target);
        }
        Some(getter) => {
            m.invoke_virtual(plan.class_name, getter, &format!("()L{target};"))
                .checkcast(&target);
        }
        None => {
            m.invoke_virtual(
                plan.class_name,
                &names::field_getter(&attr.name),
                &format!("()L{target};"),
            );
        }
    }
}

/// Calls the user setter, or the internal one, with the value pushed by
/// `value`.
fn call_setter(
    m: &mut MethodBuilder,
    plan: &WeavePlan<'_>,
    attr: &AttributeDetails,
    value: impl FnOnce(&mut MethodBuilder),
) {
    let target = reference(attr);
    m.aload(0);
    match attr.setter_name() {
        Some(setter) if attr.uses_keyed_accessors() => {
            m.ldc(&attr.name);
            value(m);
            m.invoke_virtual(plan.class_name, setter, names::VIRTUAL_SETTER_DESC)
                .op(Opcode::Pop);
        }
        Some(setter) => {
            value(m);
            m.invoke_virtual(plan.class_name, setter, &format!("(L{target};)V"));
        }
        None => {
            value(m);
            m.invoke_virtual(
                plan.class_name,
                &names::field_setter(&attr.name),
                &format!("(L{target};)V"),
            );
        }
    }
}

fn holder_initializer(plan: &WeavePlan<'_>, attr: &AttributeDetails) -> MethodBuilder {
    let mut m = MethodBuilder::new(ACC_PROTECTED, names::holder_initializer(&attr.name), "()V");
    let done = m.new_label();
    load_holder(&mut m, plan, attr);
    m.jump(Opcode::Ifnonnull, done)
        .aload(0)
        .new_object(names::VALUE_HOLDER)
        .op(Opcode::Dup);
    if attr.has_field {
        m.aload(0)
            .get_field(plan.class_name, &attr.name, &attr.descriptor())
            .invoke_special(names::VALUE_HOLDER, "<init>", "(Ljava/lang/Object;)V");
    } else {
        m.invoke_special(names::VALUE_HOLDER, "<init>", "()V");
    }
    m.put_field(
        plan.class_name,
        &names::holder_field(&attr.name),
        names::VALUE_HOLDER_INTERFACE_DESC,
    );
    load_holder(&mut m, plan, attr);
    m.op(Opcode::Iconst1);
    holder_call(&mut m, "setIsNewlyWeavedValueHolder", "(Z)V");
    m.mark(done).op(Opcode::Return);
    m
}

/// Returns the holder after pushing any value set directly on the field
/// into it.
fn holder_getter(plan: &WeavePlan<'_>, attr: &AttributeDetails) -> MethodBuilder {
    let mut m = MethodBuilder::new(
        ACC_PUBLIC,
        names::holder_getter(&attr.name),
        format!("(){}", names::VALUE_HOLDER_INTERFACE_DESC),
    );
    let resync = m.new_label();
    let done = m.new_label();
    m.aload(0)
        .invoke_virtual(plan.class_name, &names::holder_initializer(&attr.name), "()V");
    load_holder(&mut m, plan, attr);
    holder_call(&mut m, "isCoordinatedWithProperty", "()Z");
    m.jump(Opcode::Ifne, resync);
    load_holder(&mut m, plan, attr);
    holder_call(&mut m, "isNewlyWeavedValueHolder", "()Z");
    m.jump(Opcode::Ifeq, done).mark(resync);

    call_getter(&mut m, plan, attr);
    m.var(Opcode::Astore, 1).aload(1);
    load_holder(&mut m, plan, attr);
    holder_call(&mut m, "getValue", "()Ljava/lang/Object;");
    m.jump(Opcode::IfAcmpeq, done);
    call_setter(&mut m, plan, attr, |m| {
        m.aload(1);
    });

    m.mark(done);
    load_holder(&mut m, plan, attr);
    m.op(Opcode::Areturn);
    m
}

/// Installs a holder; an instantiated one pushes its value to the attribute
/// when it differs, an uninstantiated one clears the field.
fn holder_setter(plan: &WeavePlan<'_>, attr: &AttributeDetails) -> MethodBuilder {
    let mut m = MethodBuilder::new(
        ACC_PUBLIC,
        names::holder_setter(&attr.name),
        format!("({})V", names::VALUE_HOLDER_INTERFACE_DESC),
    );
    let target = reference(attr);
    let uninstantiated = m.new_label();
    m.aload(0).aload(1).put_field(
        plan.class_name,
        &names::holder_field(&attr.name),
        names::VALUE_HOLDER_INTERFACE_DESC,
    );
    m.aload(1);
    holder_call(&mut m, "isInstantiated", "()Z");
    m.jump(Opcode::Ifeq, uninstantiated);

    call_getter(&mut m, plan, attr);
    m.var(Opcode::Astore, 2).aload(1);
    holder_call(&mut m, "getValue", "()Ljava/lang/Object;");
    m.var(Opcode::Astore, 3).aload(2).aload(3);

    if attr.setter_name().is_some() {
        m.jump(Opcode::IfAcmpeq, uninstantiated);
        call_setter(&mut m, plan, attr, |m| {
            m.aload(3).checkcast(&target);
        });
        m.mark(uninstantiated);
    } else {
        let unchanged = m.new_label();
        let done = m.new_label();
        m.jump(Opcode::IfAcmpeq, unchanged);
        call_setter(&mut m, plan, attr, |m| {
            m.aload(3).checkcast(&target);
        });
        m.mark(unchanged).jump(Opcode::Goto, done).mark(uninstantiated);
        if attr.has_field {
            m.aload(0)
                .op(Opcode::AconstNull)
                .put_field(plan.class_name, &attr.name, &attr.descriptor());
        }
        m.mark(done);
    }
    m.op(Opcode::Return);
    m
}

/// Boxes a primitive on top of the stack.
///
/// Uses `valueOf` rather than `new Wrapper(..)`: cached small values are the
/// same object, so an unchanged primitive fires no change event.
pub(crate) fn box_value(m: &mut MethodBuilder, ty: &JavaType) {
    if let Some(wrapper) = ty.wrapper() {
        m.invoke_static(wrapper, "valueOf", &names::value_of_descriptor(ty, wrapper));
    }
}

/// Casts an `Object` on top of the stack to the attribute's type,
/// unboxing primitives.
pub(crate) fn unbox_value(m: &mut MethodBuilder, attr: &AttributeDetails) {
    m.checkcast(&attr.cast_target());
    if let (Some(wrapper), Some(method)) = (attr.java_type.wrapper(), attr.java_type.unbox_method())
    {
        m.invoke_virtual(wrapper, method, &format!("(){}", attr.descriptor()));
    }
}

fn check_fetched(m: &mut MethodBuilder, plan: &WeavePlan<'_>, attr: &AttributeDetails, guard: &str) {
    m.aload(0)
        .ldc(&attr.name)
        .invoke_virtual(plan.class_name, guard, "(Ljava/lang/String;)V");
}

/// `_persistence_get_<a>()`: fetch check, holder sync, then the field.
fn field_getter(plan: &WeavePlan<'_>, attr: &AttributeDetails) -> MethodBuilder {
    let mut m = MethodBuilder::new(
        ACC_PUBLIC,
        names::field_getter(&attr.name),
        format!("(){}", attr.descriptor()),
    );
    if plan.fetch_groups {
        check_fetched(&mut m, plan, attr, names::CHECK_FETCHED);
    }
    if plan.weaves_holder(attr) {
        sync_from_holder(&mut m, plan, attr);
    }
    m.aload(0)
        .get_field(plan.class_name, &attr.name, &attr.descriptor())
        .ret(&attr.java_type);
    m
}

/// `_persistence_set_<a>(v)`: the old value is read and announced before
/// the field is assigned, and the holder follows the assignment.
fn field_setter(plan: &WeavePlan<'_>, attr: &AttributeDetails) -> MethodBuilder {
    let ty = &attr.java_type;
    let mut m = MethodBuilder::new(
        ACC_PUBLIC,
        names::field_setter(&attr.name),
        format!("({})V", attr.descriptor()),
    );
    if plan.fetch_groups {
        check_fetched(&mut m, plan, attr, names::CHECK_FETCHED_FOR_SET);
    }
    if plan.weaves_holder(attr) {
        sync_from_holder(&mut m, plan, attr);
    }
    if plan.change_tracking {
        m.aload(0)
            .ldc(&attr.name)
            .aload(0)
            .get_field(plan.class_name, &attr.name, &attr.descriptor());
        box_value(&mut m, ty);
        m.load(ty, 1);
        box_value(&mut m, ty);
        m.invoke_virtual(plan.class_name, names::PROPERTY_CHANGE, names::PROPERTY_CHANGE_DESC);
    }
    m.aload(0)
        .load(ty, 1)
        .put_field(plan.class_name, &attr.name, &attr.descriptor());
    if plan.weaves_holder(attr) {
        load_holder(&mut m, plan, attr);
        m.aload(1);
        holder_call(&mut m, "setValue", "(Ljava/lang/Object;)V");
    }
    m.op(Opcode::Return);
    m
}
