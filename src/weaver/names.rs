//! Names of the runtime types and synthesized members the woven code links
//! against. Downstream code looks these up by exact name.

use crate::classfile::JavaType;

pub const OBJECT: &str = "java/lang/Object";
pub const OBJECT_DESC: &str = "Ljava/lang/Object;";
pub const STRING_DESC: &str = "Ljava/lang/String;";
pub const CLONEABLE: &str = "java/lang/Cloneable";

pub const PERSISTENCE_WEAVED: &str = "org/eclipse/persistence/internal/weaving/PersistenceWeaved";
pub const PERSISTENCE_WEAVED_LAZY: &str =
    "org/eclipse/persistence/internal/weaving/PersistenceWeavedLazy";
pub const PERSISTENCE_WEAVED_CHANGE_TRACKING: &str =
    "org/eclipse/persistence/internal/weaving/PersistenceWeavedChangeTracking";
pub const PERSISTENCE_WEAVED_FETCH_GROUPS: &str =
    "org/eclipse/persistence/internal/weaving/PersistenceWeavedFetchGroups";
pub const PERSISTENCE_WEAVED_REST: &str =
    "org/eclipse/persistence/internal/weaving/PersistenceWeavedRest";

pub const PERSISTENCE_ENTITY: &str = "org/eclipse/persistence/internal/descriptors/PersistenceEntity";
pub const PERSISTENCE_OBJECT: &str = "org/eclipse/persistence/internal/descriptors/PersistenceObject";
pub const PERSISTENCE_OBJECT_DESC: &str =
    "Lorg/eclipse/persistence/internal/descriptors/PersistenceObject;";
pub const CACHE_KEY_DESC: &str = "Lorg/eclipse/persistence/internal/identitymaps/CacheKey;";

pub const VALUE_HOLDER_INTERFACE: &str =
    "org/eclipse/persistence/indirection/WeavedAttributeValueHolderInterface";
pub const VALUE_HOLDER_INTERFACE_DESC: &str =
    "Lorg/eclipse/persistence/indirection/WeavedAttributeValueHolderInterface;";
pub const VALUE_HOLDER: &str = "org/eclipse/persistence/indirection/ValueHolder";

pub const CHANGE_TRACKER: &str = "org/eclipse/persistence/descriptors/changetracking/ChangeTracker";
pub const LISTENER: &str = "java/beans/PropertyChangeListener";
pub const LISTENER_DESC: &str = "Ljava/beans/PropertyChangeListener;";
pub const CHANGE_EVENT: &str = "java/beans/PropertyChangeEvent";

pub const FETCH_GROUP_TRACKER: &str = "org/eclipse/persistence/queries/FetchGroupTracker";
pub const FETCH_GROUP: &str = "org/eclipse/persistence/queries/FetchGroup";
pub const FETCH_GROUP_DESC: &str = "Lorg/eclipse/persistence/queries/FetchGroup;";
pub const SESSION_DESC: &str = "Lorg/eclipse/persistence/sessions/Session;";
pub const ENTITY_MANAGER_IMPL: &str = "org/eclipse/persistence/internal/jpa/EntityManagerImpl";

pub const LIST_DESC: &str = "Ljava/util/List;";
pub const LINK_DESC: &str = "Lorg/eclipse/persistence/internal/jpa/rs/metadata/model/Link;";
pub const ITEM_LINKS_DESC: &str =
    "Lorg/eclipse/persistence/internal/jpa/rs/metadata/model/ItemLinks;";

pub const JPA_TRANSIENT: &str = "Ljakarta/persistence/Transient;";
pub const XML_TRANSIENT: &str = "Ljavax/xml/bind/annotation/XmlTransient;";
/// Probed on the classpath to decide whether `XML_TRANSIENT` is emitted.
pub const XML_TRANSIENT_CLASS: &str = "javax/xml/bind/annotation/XmlTransient";

pub const PREFIX: &str = "_persistence_";
pub const GET: &str = "_persistence_get_";
pub const SET: &str = "_persistence_set_";
pub const HOLDER_SUFFIX: &str = "_vh";

pub const VIRTUAL_GETTER_DESC: &str = "(Ljava/lang/String;)Ljava/lang/Object;";
pub const VIRTUAL_SETTER_DESC: &str = "(Ljava/lang/String;Ljava/lang/Object;)Ljava/lang/Object;";

pub const LISTENER_FIELD: &str = "_persistence_listener";
pub const PRIMARY_KEY_FIELD: &str = "_persistence_primaryKey";
pub const CACHE_KEY_FIELD: &str = "_persistence_cacheKey";
pub const FETCH_GROUP_FIELD: &str = "_persistence_fetchGroup";
pub const REFRESH_FIELD: &str = "_persistence_shouldRefreshFetchGroup";
pub const SESSION_FIELD: &str = "_persistence_session";
pub const RELATIONSHIPS_FIELD: &str = "_persistence_relationshipInfo";
pub const HREF_FIELD: &str = "_persistence_href";
pub const LINKS_FIELD: &str = "_persistence_links";

pub const POST_CLONE: &str = "_persistence_post_clone";
pub const SHALLOW_CLONE: &str = "_persistence_shallow_clone";
pub const NEW: &str = "_persistence_new";
pub const GENERIC_GET: &str = "_persistence_get";
pub const GENERIC_SET: &str = "_persistence_set";
pub const PROPERTY_CHANGE: &str = "_persistence_propertyChange";
pub const PROPERTY_CHANGE_DESC: &str =
    "(Ljava/lang/String;Ljava/lang/Object;Ljava/lang/Object;)V";
pub const CHECK_FETCHED: &str = "_persistence_checkFetched";
pub const CHECK_FETCHED_FOR_SET: &str = "_persistence_checkFetchedForSet";
pub const IS_ATTRIBUTE_FETCHED: &str = "_persistence_isAttributeFetched";

pub fn holder_field(attribute: &str) -> String {
    format!("{PREFIX}{attribute}{HOLDER_SUFFIX}")
}

pub fn holder_initializer(attribute: &str) -> String {
    format!("{PREFIX}initialize_{attribute}{HOLDER_SUFFIX}")
}

pub fn holder_getter(attribute: &str) -> String {
    format!("{GET}{attribute}{HOLDER_SUFFIX}")
}

pub fn holder_setter(attribute: &str) -> String {
    format!("{SET}{attribute}{HOLDER_SUFFIX}")
}

pub fn field_getter(attribute: &str) -> String {
    format!("{GET}{attribute}")
}

pub fn field_setter(attribute: &str) -> String {
    format!("{SET}{attribute}")
}

/// `Integer.valueOf(I)Ljava/lang/Integer;` and friends.
pub fn value_of_descriptor(ty: &JavaType, wrapper: &str) -> String {
    format!("({})L{wrapper};", ty.descriptor())
}
