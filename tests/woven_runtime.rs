//! Runs woven classes on a real JVM with full verification. Needs a JDK at
//! `JAVA_HOME`; without one the test only reports that it was skipped.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const MODEL: &str = r#"{
  "classes": [
    {
      "name": "com.acme.Employee",
      "weave_internal": true,
      "weave_value_holders": true,
      "weave_change_tracking": true,
      "weave_fetch_groups": true,
      "attributes": [
        {"name": "salary", "type": "int"},
        {"name": "manager", "type": "com.acme.Employee", "weave_value_holders": true}
      ]
    },
    {
      "name": "com.acme.Manager",
      "superclass": "com.acme.Employee",
      "weave_internal": true,
      "weave_change_tracking": true,
      "weave_fetch_groups": true,
      "attributes": [{"name": "title", "type": "java.lang.String"}]
    }
  ]
}"#;

/// Minimal stand-ins for the persistence runtime the woven code links to.
const RUNTIME: &[(&str, &str)] = &[
    (
        "org/eclipse/persistence/internal/weaving/PersistenceWeaved.java",
        "package org.eclipse.persistence.internal.weaving;\npublic interface PersistenceWeaved {}\n",
    ),
    (
        "org/eclipse/persistence/internal/weaving/PersistenceWeavedLazy.java",
        "package org.eclipse.persistence.internal.weaving;\npublic interface PersistenceWeavedLazy {}\n",
    ),
    (
        "org/eclipse/persistence/internal/weaving/PersistenceWeavedChangeTracking.java",
        "package org.eclipse.persistence.internal.weaving;\npublic interface PersistenceWeavedChangeTracking {}\n",
    ),
    (
        "org/eclipse/persistence/internal/weaving/PersistenceWeavedFetchGroups.java",
        "package org.eclipse.persistence.internal.weaving;\npublic interface PersistenceWeavedFetchGroups {}\n",
    ),
    (
        "org/eclipse/persistence/internal/descriptors/PersistenceEntity.java",
        "package org.eclipse.persistence.internal.descriptors;\npublic interface PersistenceEntity {}\n",
    ),
    (
        "org/eclipse/persistence/internal/descriptors/PersistenceObject.java",
        r#"package org.eclipse.persistence.internal.descriptors;
public interface PersistenceObject {
    Object _persistence_new(PersistenceObject factory);
    Object _persistence_shallow_clone();
    Object _persistence_post_clone();
    Object _persistence_get(String attribute);
    void _persistence_set(String attribute, Object value);
}
"#,
    ),
    (
        "org/eclipse/persistence/internal/identitymaps/CacheKey.java",
        "package org.eclipse.persistence.internal.identitymaps;\npublic class CacheKey {}\n",
    ),
    (
        "org/eclipse/persistence/sessions/Session.java",
        "package org.eclipse.persistence.sessions;\npublic interface Session {}\n",
    ),
    (
        "org/eclipse/persistence/descriptors/changetracking/ChangeTracker.java",
        r#"package org.eclipse.persistence.descriptors.changetracking;
import java.beans.PropertyChangeListener;
public interface ChangeTracker {
    PropertyChangeListener _persistence_getPropertyChangeListener();
    void _persistence_setPropertyChangeListener(PropertyChangeListener listener);
}
"#,
    ),
    (
        "org/eclipse/persistence/queries/FetchGroup.java",
        r#"package org.eclipse.persistence.queries;
import java.util.Arrays;
import java.util.HashSet;
import java.util.Set;
public class FetchGroup {
    private final Set<String> attributes;
    public FetchGroup(String... attributes) {
        this.attributes = new HashSet<>(Arrays.asList(attributes));
    }
    public boolean containsAttributeInternal(String attribute) {
        return attributes.contains(attribute);
    }
}
"#,
    ),
    (
        "org/eclipse/persistence/queries/FetchGroupTracker.java",
        r#"package org.eclipse.persistence.queries;
public interface FetchGroupTracker {
    FetchGroup _persistence_getFetchGroup();
    void _persistence_setFetchGroup(FetchGroup group);
    boolean _persistence_isAttributeFetched(String attribute);
}
"#,
    ),
    (
        "org/eclipse/persistence/internal/jpa/EntityManagerImpl.java",
        r#"package org.eclipse.persistence.internal.jpa;
import java.util.ArrayList;
import java.util.List;
import org.eclipse.persistence.queries.FetchGroupTracker;
public class EntityManagerImpl {
    public static final List<String> log = new ArrayList<>();
    public static void processUnfetchedAttribute(FetchGroupTracker entity, String attribute) {
        log.add("read:" + attribute);
    }
    public static void processUnfetchedAttributeForSet(FetchGroupTracker entity, String attribute) {
        log.add("write:" + attribute);
    }
}
"#,
    ),
    (
        "org/eclipse/persistence/indirection/WeavedAttributeValueHolderInterface.java",
        r#"package org.eclipse.persistence.indirection;
public interface WeavedAttributeValueHolderInterface {
    Object getValue();
    void setValue(Object value);
    boolean isInstantiated();
    boolean isCoordinatedWithProperty();
    boolean isNewlyWeavedValueHolder();
    void setIsNewlyWeavedValueHolder(boolean newly);
    Object clone();
}
"#,
    ),
    (
        "org/eclipse/persistence/indirection/ValueHolder.java",
        r#"package org.eclipse.persistence.indirection;
public class ValueHolder implements WeavedAttributeValueHolderInterface, Cloneable {
    public static int created;
    private Object value;
    private boolean newly;
    public ValueHolder() { created++; }
    public ValueHolder(Object value) { this(); this.value = value; }
    public Object getValue() { return value; }
    public void setValue(Object value) { this.value = value; }
    public boolean isInstantiated() { return true; }
    public boolean isCoordinatedWithProperty() { return false; }
    public boolean isNewlyWeavedValueHolder() { return newly; }
    public void setIsNewlyWeavedValueHolder(boolean newly) { this.newly = newly; }
    public Object clone() {
        try {
            return super.clone();
        } catch (CloneNotSupportedException e) {
            throw new AssertionError(e);
        }
    }
}
"#,
    ),
];

const ENTITIES: &[(&str, &str)] = &[
    (
        "com/acme/Employee.java",
        r#"package com.acme;
public class Employee {
    private int salary;
    private Employee manager;
    public int getSalary() { return salary; }
    public void setSalary(int salary) { this.salary = salary; }
    public Employee getManager() { return manager; }
    public void setManager(Employee manager) { this.manager = manager; }
}
"#,
    ),
    (
        "com/acme/Manager.java",
        r#"package com.acme;
public class Manager extends Employee {
    private String title;
    public String getTitle() { return title; }
    public void setTitle(String title) { this.title = title; }
}
"#,
    ),
    (
        "com/acme/Driver.java",
        r#"package com.acme;
import java.beans.PropertyChangeListener;
import java.util.ArrayList;
import java.util.List;
import org.eclipse.persistence.descriptors.changetracking.ChangeTracker;
import org.eclipse.persistence.indirection.ValueHolder;
import org.eclipse.persistence.internal.descriptors.PersistenceObject;
import org.eclipse.persistence.internal.jpa.EntityManagerImpl;
import org.eclipse.persistence.queries.FetchGroup;
import org.eclipse.persistence.queries.FetchGroupTracker;

public class Driver {
    public static void main(String[] args) {
        Employee boss = new Employee();
        Employee e = new Employee();
        int before = ValueHolder.created;
        e.setManager(boss);
        Employee first = e.getManager();
        Employee second = e.getManager();
        System.out.println("holders=" + (ValueHolder.created - before));
        System.out.println("manager=" + (first == boss && second == boss));

        List<String> events = new ArrayList<>();
        PropertyChangeListener listener = evt -> events.add(
            evt.getPropertyName() + ":" + evt.getOldValue() + "->" + evt.getNewValue());
        ((ChangeTracker) e)._persistence_setPropertyChangeListener(listener);
        e.setSalary(1);
        e.setSalary(2);
        e.setSalary(3);
        e.setSalary(3);
        System.out.println("events=" + events);

        PersistenceObject po = (PersistenceObject) e;
        System.out.println("get=" + po._persistence_get("salary") + "," + po._persistence_get("unknown"));
        po._persistence_set("salary", 7);
        System.out.println("set=" + e.getSalary());

        Manager m = new Manager();
        m.setSalary(5);
        m.setTitle("cto");
        PersistenceObject pm = (PersistenceObject) m;
        System.out.println("chain=" + pm._persistence_get("title") + "," + pm._persistence_get("salary"));

        Employee copy = (Employee) po._persistence_shallow_clone();
        ((PersistenceObject) copy)._persistence_post_clone();
        System.out.println("clone="
            + (((ChangeTracker) copy)._persistence_getPropertyChangeListener() == null) + ","
            + (copy.getManager() == boss) + ","
            + (((ChangeTracker) e)._persistence_getPropertyChangeListener() == listener));

        ((FetchGroupTracker) e)._persistence_setFetchGroup(new FetchGroup("salary"));
        e.getSalary();
        e.getManager();
        e.setManager(null);
        System.out.println("unfetched=" + EntityManagerImpl.log);
    }
}
"#,
    ),
];

const EXPECTED: &str = "holders=1
manager=true
events=[salary:0->1, salary:1->2, salary:2->3]
get=3,null
set=7
chain=cto,5
clone=true,true,true
unfetched=[read:manager, write:manager]
";

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_weaver_jvm_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// `$JAVA_HOME/bin` when it holds a full JDK.
fn jdk_bin() -> Option<PathBuf> {
    let bin = PathBuf::from(std::env::var_os("JAVA_HOME")?).join("bin");
    ["javac", "java", "javap"]
        .iter()
        .all(|tool| bin.join(tool).is_file())
        .then_some(bin)
}

fn checked(out: Output, what: &str) -> anyhow::Result<String> {
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "{what} failed: status={:?}, stdout={}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

#[test]
fn woven_entities_verify_and_behave_on_the_jvm() -> anyhow::Result<()> {
    let Some(bin) = jdk_bin() else {
        eprintln!("skipping: JAVA_HOME does not point at a JDK");
        return Ok(());
    };

    let base = temp_dir("runtime");
    let sources = base.join("src");
    let classes = base.join("classes");
    let woven = base.join("woven");
    let model = base.join("model.json");
    write_file(&model, MODEL)?;

    let mut files = Vec::new();
    for (path, source) in RUNTIME.iter().chain(ENTITIES) {
        let file = sources.join(path);
        write_file(&file, source)?;
        files.push(file);
    }
    checked(
        Command::new(bin.join("javac"))
            .args(["--release", "8", "-nowarn", "-d"])
            .arg(&classes)
            .args(&files)
            .output()?,
        "javac",
    )?;

    let db = base.join("ledger.lmdb");
    let weave: serde_json::Value = serde_json::from_str(&checked(
        Command::new(env!("CARGO_BIN_EXE_class-weaver"))
            .arg("--db")
            .arg(&db)
            .args(["weave", "--java-version", "1.8", "-m"])
            .arg(&model)
            .arg(&classes)
            .arg("-o")
            .arg(&woven)
            .output()?,
        "weave",
    )?)?;
    assert_eq!(weave["inputs"][0]["woven"], serde_json::Value::from(2));

    let javap = checked(
        Command::new(bin.join("javap"))
            .args(["-v", "-p", "-cp"])
            .arg(&woven)
            .arg("com.acme.Employee")
            .output()?,
        "javap",
    )?;
    assert!(javap.contains("major version: 52"));
    assert!(javap.contains("_persistence_set_salary"));
    assert!(javap.contains("StackMapTable"));

    let run = checked(
        Command::new(bin.join("java"))
            .args(["-Xverify:all", "-cp"])
            .arg(&woven)
            .arg("com.acme.Driver")
            .output()?,
        "java",
    )?;
    assert_eq!(run.replace("\r\n", "\n"), EXPECTED);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
