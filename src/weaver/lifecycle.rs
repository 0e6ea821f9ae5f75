//! Class-level members: cloning hooks, identity, construction, keyed
//! dispatch, change listeners, fetch-group state and REST links.

use super::members::{box_value, unbox_value};
use super::names;
use super::plan::WeavePlan;
use crate::classfile::JavaType;
use crate::classfile::access::{ACC_PROTECTED, ACC_PUBLIC, ACC_TRANSIENT};
use crate::emit::{ClassBuilder, FieldSpec, MethodBuilder, Opcode};
use crate::error::WeaveError;

const OBJECT_GETTER: &str = "()Ljava/lang/Object;";
const STRING_PREDICATE: &str = "(Ljava/lang/String;)Z";
const STRING_CONSUMER: &str = "(Ljava/lang/String;)V";

/// Plain `get<X>`/`set<X>` pair over a field of this class.
fn add_property(
    builder: &mut ClassBuilder,
    plan: &WeavePlan<'_>,
    field: &str,
    descriptor: &str,
    getter: &str,
    setter: &str,
) -> Result<(), WeaveError> {
    let ty = JavaType::from_descriptor(descriptor)?;

    let mut get = MethodBuilder::new(ACC_PUBLIC, getter, format!("(){descriptor}"));
    get.aload(0)
        .get_field(plan.class_name, field, descriptor)
        .ret(&ty);
    builder.add_method(get)?;

    let mut set = MethodBuilder::new(ACC_PUBLIC, setter, format!("({descriptor})V"));
    set.aload(0)
        .load(&ty, 1)
        .put_field(plan.class_name, field, descriptor)
        .op(Opcode::Return);
    builder.add_method(set)
}

fn transient_field(name: &str, descriptor: &str) -> FieldSpec {
    FieldSpec::new(ACC_PROTECTED | ACC_TRANSIENT, name, descriptor)
}

pub(crate) fn weave_internal(
    builder: &mut ClassBuilder,
    plan: &WeavePlan<'_>,
) -> Result<(), WeaveError> {
    builder.add_method(post_clone(plan))?;
    if plan.root {
        builder.add_method(shallow_clone())?;
        if !plan.embeddable {
            builder.add_field(transient_field(names::PRIMARY_KEY_FIELD, names::OBJECT_DESC))?;
            builder.add_field(transient_field(names::CACHE_KEY_FIELD, names::CACHE_KEY_DESC))?;
            add_property(
                builder,
                plan,
                names::PRIMARY_KEY_FIELD,
                names::OBJECT_DESC,
                "_persistence_getId",
                "_persistence_setId",
            )?;
            add_property(
                builder,
                plan,
                names::CACHE_KEY_FIELD,
                names::CACHE_KEY_DESC,
                "_persistence_getCacheKey",
                "_persistence_setCacheKey",
            )?;
        }
    }
    add_persistence_new(builder, plan)?;
    builder.add_method(generic_get(plan))?;
    builder.add_method(generic_set(plan))
}

/// Deep-copies holders and drops per-instance back references after a
/// shallow clone.
fn post_clone(plan: &WeavePlan<'_>) -> MethodBuilder {
    let mut m = MethodBuilder::new(ACC_PUBLIC, names::POST_CLONE, OBJECT_GETTER);
    if plan.superclass_internal {
        m.aload(0)
            .invoke_special(&plan.super_name, names::POST_CLONE, OBJECT_GETTER)
            .op(Opcode::Pop);
    }
    for attr in plan.own_attributes().filter(|a| plan.weaves_holder(a)) {
        let holder = names::holder_field(&attr.name);
        let skip = m.new_label();
        m.aload(0)
            .get_field(plan.class_name, &holder, names::VALUE_HOLDER_INTERFACE_DESC)
            .jump(Opcode::Ifnull, skip)
            .aload(0)
            .aload(0)
            .get_field(plan.class_name, &holder, names::VALUE_HOLDER_INTERFACE_DESC)
            .invoke_interface(names::VALUE_HOLDER_INTERFACE, "clone", OBJECT_GETTER)
            .checkcast(names::VALUE_HOLDER_INTERFACE)
            .put_field(plan.class_name, &holder, names::VALUE_HOLDER_INTERFACE_DESC)
            .mark(skip);
    }
    let mut clear = |field: &str, descriptor: &str| {
        m.aload(0)
            .op(Opcode::AconstNull)
            .put_field(plan.class_name, field, descriptor);
    };
    if plan.change_tracking {
        clear(names::LISTENER_FIELD, names::LISTENER_DESC);
    }
    if plan.fetch_groups {
        clear(names::FETCH_GROUP_FIELD, names::FETCH_GROUP_DESC);
        clear(names::SESSION_FIELD, names::SESSION_DESC);
    }
    if !plan.embeddable {
        clear(names::PRIMARY_KEY_FIELD, names::OBJECT_DESC);
    }
    m.aload(0).op(Opcode::Areturn);
    m
}

fn shallow_clone() -> MethodBuilder {
    let mut m = MethodBuilder::new(ACC_PUBLIC, names::SHALLOW_CLONE, OBJECT_GETTER);
    m.aload(0)
        .invoke_special(names::OBJECT, "clone", OBJECT_GETTER)
        .op(Opcode::Areturn);
    m
}

/// Factory used instead of reflective construction, plus the constructor
/// overload it calls when the class allows it.
fn add_persistence_new(builder: &mut ClassBuilder, plan: &WeavePlan<'_>) -> Result<(), WeaveError> {
    let token_ctor = format!("({})V", names::PERSISTENCE_OBJECT_DESC);
    let mut factory = MethodBuilder::new(
        ACC_PUBLIC,
        names::NEW,
        format!("({})Ljava/lang/Object;", names::PERSISTENCE_OBJECT_DESC),
    );
    factory.new_object(plan.class_name).op(Opcode::Dup);
    if !plan.constructor_optimization {
        factory
            .invoke_special(plan.class_name, "<init>", "()V")
            .op(Opcode::Areturn);
        return builder.add_method(factory);
    }
    factory
        .aload(1)
        .invoke_special(plan.class_name, "<init>", &token_ctor)
        .op(Opcode::Areturn);
    builder.add_method(factory)?;

    let mut ctor = MethodBuilder::new(ACC_PUBLIC, "<init>", token_ctor.clone());
    ctor.aload(0);
    if plan.superclass_constructor_optimization {
        ctor.aload(1)
            .invoke_special(&plan.super_name, "<init>", &token_ctor);
    } else {
        ctor.invoke_special(&plan.super_name, "<init>", "()V");
    }
    ctor.op(Opcode::Return);
    builder.add_method(ctor)
}

/// `_persistence_get(String)`: identity comparison against interned names,
/// then the superclass.
fn generic_get(plan: &WeavePlan<'_>) -> MethodBuilder {
    let mut m = MethodBuilder::new(ACC_PUBLIC, names::GENERIC_GET, names::VIRTUAL_GETTER_DESC);
    for attr in dispatched(plan) {
        let next = m.new_label();
        m.aload(1)
            .ldc(&attr.name)
            .jump(Opcode::IfAcmpne, next)
            .aload(0)
            .get_field(plan.class_name, &attr.name, &attr.descriptor());
        box_value(&mut m, &attr.java_type);
        m.op(Opcode::Areturn).mark(next);
    }
    if plan.root {
        m.op(Opcode::AconstNull);
    } else {
        m.aload(0)
            .aload(1)
            .invoke_special(&plan.super_name, names::GENERIC_GET, names::VIRTUAL_GETTER_DESC);
    }
    m.op(Opcode::Areturn);
    m
}

fn generic_set(plan: &WeavePlan<'_>) -> MethodBuilder {
    const DESC: &str = "(Ljava/lang/String;Ljava/lang/Object;)V";
    let mut m = MethodBuilder::new(ACC_PUBLIC, names::GENERIC_SET, DESC);
    for attr in dispatched(plan) {
        let next = m.new_label();
        m.aload(1)
            .ldc(&attr.name)
            .jump(Opcode::IfAcmpne, next)
            .aload(0)
            .aload(2);
        unbox_value(&mut m, attr);
        m.put_field(plan.class_name, &attr.name, &attr.descriptor())
            .op(Opcode::Return)
            .mark(next);
    }
    if !plan.root {
        m.aload(0)
            .aload(1)
            .aload(2)
            .invoke_special(&plan.super_name, names::GENERIC_SET, DESC);
    }
    m.op(Opcode::Return);
    m
}

/// Attributes reachable through the keyed dispatchers: declared here,
/// backed by a field, not virtual.
fn dispatched<'a>(
    plan: &WeavePlan<'a>,
) -> impl Iterator<Item = &'a crate::model::AttributeDetails> + use<'a> {
    plan.own_attributes()
        .filter(|a| a.has_field && !a.virtual_property)
}

/// Listener field and accessors, and the change announcer.
pub(crate) fn weave_change_listener(
    builder: &mut ClassBuilder,
    plan: &WeavePlan<'_>,
) -> Result<(), WeaveError> {
    builder.add_field(transient_field(names::LISTENER_FIELD, names::LISTENER_DESC))?;
    add_property(
        builder,
        plan,
        names::LISTENER_FIELD,
        names::LISTENER_DESC,
        "_persistence_getPropertyChangeListener",
        "_persistence_setPropertyChangeListener",
    )?;

    let mut m = MethodBuilder::new(ACC_PUBLIC, names::PROPERTY_CHANGE, names::PROPERTY_CHANGE_DESC);
    let done = m.new_label();
    m.aload(0)
        .get_field(plan.class_name, names::LISTENER_FIELD, names::LISTENER_DESC)
        .jump(Opcode::Ifnull, done)
        .aload(2)
        .aload(3)
        .jump(Opcode::IfAcmpeq, done)
        .aload(0)
        .get_field(plan.class_name, names::LISTENER_FIELD, names::LISTENER_DESC)
        .new_object(names::CHANGE_EVENT)
        .op(Opcode::Dup)
        .aload(0)
        .aload(1)
        .aload(2)
        .aload(3)
        .invoke_special(
            names::CHANGE_EVENT,
            "<init>",
            "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Object;Ljava/lang/Object;)V",
        )
        .invoke_interface(
            names::LISTENER,
            "propertyChange",
            "(Ljava/beans/PropertyChangeEvent;)V",
        )
        .mark(done)
        .op(Opcode::Return);
    builder.add_method(m)
}

/// Fetch-group state and the guards every intercepted accessor calls.
pub(crate) fn weave_fetch_groups(
    builder: &mut ClassBuilder,
    plan: &WeavePlan<'_>,
) -> Result<(), WeaveError> {
    let mut group = FieldSpec::new(ACC_PROTECTED, names::FETCH_GROUP_FIELD, names::FETCH_GROUP_DESC);
    if plan.attribute_access {
        group = group.annotated(names::JPA_TRANSIENT);
    }
    if plan.xml_transient {
        group = group.annotated(names::XML_TRANSIENT);
    }
    builder.add_field(group)?;
    builder.add_field(transient_field(names::REFRESH_FIELD, "Z"))?;
    builder.add_field(transient_field(names::SESSION_FIELD, names::SESSION_DESC))?;

    add_property(
        builder,
        plan,
        names::SESSION_FIELD,
        names::SESSION_DESC,
        "_persistence_getSession",
        "_persistence_setSession",
    )?;
    add_property(
        builder,
        plan,
        names::FETCH_GROUP_FIELD,
        names::FETCH_GROUP_DESC,
        "_persistence_getFetchGroup",
        "_persistence_setFetchGroup",
    )?;
    add_property(
        builder,
        plan,
        names::REFRESH_FIELD,
        "Z",
        "_persistence_shouldRefreshFetchGroup",
        "_persistence_setShouldRefreshFetchGroup",
    )?;

    let mut reset = MethodBuilder::new(ACC_PUBLIC, "_persistence_resetFetchGroup", "()V");
    reset.op(Opcode::Return);
    builder.add_method(reset)?;

    let mut fetched = MethodBuilder::new(ACC_PUBLIC, names::IS_ATTRIBUTE_FETCHED, STRING_PREDICATE);
    let yes = fetched.new_label();
    let no = fetched.new_label();
    let done = fetched.new_label();
    fetched
        .aload(0)
        .get_field(plan.class_name, names::FETCH_GROUP_FIELD, names::FETCH_GROUP_DESC)
        .jump(Opcode::Ifnull, yes)
        .aload(0)
        .get_field(plan.class_name, names::FETCH_GROUP_FIELD, names::FETCH_GROUP_DESC)
        .aload(1)
        .invoke_virtual(names::FETCH_GROUP, "containsAttributeInternal", STRING_PREDICATE)
        .jump(Opcode::Ifeq, no)
        .mark(yes)
        .op(Opcode::Iconst1)
        .jump(Opcode::Goto, done)
        .mark(no)
        .op(Opcode::Iconst0)
        .mark(done)
        .op(Opcode::Ireturn);
    builder.add_method(fetched)?;

    builder.add_method(fetch_guard(plan, names::CHECK_FETCHED, "processUnfetchedAttribute"))?;
    builder.add_method(fetch_guard(
        plan,
        names::CHECK_FETCHED_FOR_SET,
        "processUnfetchedAttributeForSet",
    ))
}

/// Hands an unfetched attribute to the runtime instead of failing locally.
fn fetch_guard(plan: &WeavePlan<'_>, name: &str, callback: &str) -> MethodBuilder {
    let mut m = MethodBuilder::new(ACC_PUBLIC, name, STRING_CONSUMER);
    let done = m.new_label();
    m.aload(0)
        .aload(1)
        .invoke_virtual(plan.class_name, names::IS_ATTRIBUTE_FETCHED, STRING_PREDICATE)
        .jump(Opcode::Ifne, done)
        .aload(0)
        .checkcast(names::FETCH_GROUP_TRACKER)
        .aload(1)
        .invoke_static(
            names::ENTITY_MANAGER_IMPL,
            callback,
            "(Lorg/eclipse/persistence/queries/FetchGroupTracker;Ljava/lang/String;)V",
        )
        .mark(done)
        .op(Opcode::Return);
    m
}

pub(crate) fn weave_rest(builder: &mut ClassBuilder, plan: &WeavePlan<'_>) -> Result<(), WeaveError> {
    let links = [
        (names::RELATIONSHIPS_FIELD, names::LIST_DESC, "Relationships"),
        (names::HREF_FIELD, names::LINK_DESC, "Href"),
        (names::LINKS_FIELD, names::ITEM_LINKS_DESC, "Links"),
    ];
    for (field, descriptor, _) in links {
        builder.add_field(transient_field(field, descriptor))?;
    }
    for (field, descriptor, suffix) in links {
        add_property(
            builder,
            plan,
            field,
            descriptor,
            &format!("_persistence_get{suffix}"),
            &format!("_persistence_set{suffix}"),
        )?;
    }
    Ok(())
}
