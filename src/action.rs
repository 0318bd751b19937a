//! Action builder types.
//!
//! Every collection method returns one of these builders. Options are set with chained methods,
//! each consuming the builder and returning the updated value, and the action is run by
//! `.await`ing it. Builders are `Clone`, so a partially configured action can be kept and
//! specialized several times:
//!
//! ```no_run
//! # use mongo_exec::{bson::{doc, Document}, error::Result, Collection};
//! # async fn run(coll: Collection<Document>) -> Result<()> {
//! let by_name = coll.find(doc! { "name": "X" }).batch_size(50);
//! let first_page = by_name.clone().limit(10).await?;
//! let second_page = by_name.skip(10).limit(10).await?;
//! # Ok(())
//! # }
//! ```

/// Generates the option setters of an action: a private `options()` accessor creating the options
/// struct on first use, `with_options` replacing it wholesale, and one setter per listed field.
macro_rules! option_setters {
    (
        $opt_field:ident: $opt_ty:ty;
        $(
            $(#[$attr:meta])*
            $name:ident: $ty:ty,
        )+
    ) => {
        fn options(&mut self) -> &mut $opt_ty {
            self.$opt_field.get_or_insert_with(<$opt_ty>::default)
        }

        /// Set all options. Note that this will replace all previous values set.
        pub fn with_options(mut self, value: impl Into<Option<$opt_ty>>) -> Self {
            self.$opt_field = value.into();
            self
        }

        $(
            #[doc = concat!("Set the [`", stringify!($opt_ty), "::", stringify!($name), "`] option.")]
            $(#[$attr])*
            pub fn $name(mut self, value: $ty) -> Self {
                self.options().$name = Some(value);
                self
            }
        )+
    };
}

/// Implements [`IntoFuture`] for an action by boxing its `execute` method.
macro_rules! action_impl {
    ($action:ident<$lt:lifetime> => $output:ty) => {
        impl<$lt> crate::action::private::Sealed for $action<$lt> {}

        impl<$lt> crate::action::Action for $action<$lt> {}

        impl<$lt> std::future::IntoFuture for $action<$lt> {
            type Output = crate::error::Result<$output>;
            type IntoFuture = futures_util::future::BoxFuture<$lt, Self::Output>;

            fn into_future(self) -> Self::IntoFuture {
                Box::pin(self.execute())
            }
        }
    };
    ($action:ident<$lt:lifetime, $gen:ident: { $($bound:tt)+ }> => $output:ty) => {
        impl<$lt, $gen: $($bound)+> crate::action::private::Sealed for $action<$lt, $gen> {}

        impl<$lt, $gen: $($bound)+> crate::action::Action for $action<$lt, $gen> {}

        impl<$lt, $gen: $($bound)+> std::future::IntoFuture for $action<$lt, $gen> {
            type Output = crate::error::Result<$output>;
            type IntoFuture = futures_util::future::BoxFuture<$lt, Self::Output>;

            fn into_future(self) -> Self::IntoFuture {
                Box::pin(self.execute())
            }
        }
    };
}

mod delete;
mod drop_index;
mod find;
mod find_and_modify;
mod insert_many;
mod insert_one;
mod replace_one;
mod update;

use std::{future::IntoFuture, marker::PhantomData, ops::Deref};

use crate::{bson::Document, error::Error, Collection};

pub use delete::Delete;
pub use drop_index::DropIndex;
pub use find::{Find, FindOne};
pub use find_and_modify::{FindOneAndDelete, FindOneAndReplace, FindOneAndUpdate};
pub use insert_many::InsertMany;
pub use insert_one::InsertOne;
pub use replace_one::ReplaceOne;
pub use update::Update;

pub(crate) mod private {
    pub trait Sealed {}
}

/// A pending action to execute on the server. The action can be configured via chained methods
/// and executed via `await`.
pub trait Action: private::Sealed + IntoFuture {
    /// If the value is `Some`, call the provided function on `self`. Convenient for chained
    /// updates with values that need to be set conditionally. For example:
    /// ```no_run
    /// # use mongo_exec::{bson::{doc, Document}, error::Result, Collection};
    /// use mongo_exec::action::Action;
    /// async fn page(coll: &Collection<Document>, skip: Option<i64>) -> Result<()> {
    ///     let cursor = coll
    ///         .find(doc! {})
    ///         .optional(skip, |a, s| a.skip(s))
    ///         .await?;
    ///     Ok(())
    /// }
    /// ```
    fn optional<Value>(self, value: Option<Value>, f: impl FnOnce(Self, Value) -> Self) -> Self
    where
        Self: Sized,
    {
        match value {
            Some(value) => f(self, value),
            None => self,
        }
    }
}

/// A collection handle borrowed for the lifetime of an action, erased to `Collection<Document>`.
#[derive(Clone, Debug)]
pub(crate) struct CollRef<'a> {
    inner: Collection<Document>,
    _ref: PhantomData<&'a ()>,
}

impl<'a> CollRef<'a> {
    fn new<T: Send + Sync>(coll: &'a Collection<T>) -> Self {
        Self {
            inner: coll.clone_with_type(),
            _ref: PhantomData,
        }
    }
}

impl Deref for CollRef<'_> {
    type Target = Collection<Document>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Serializes a caller-provided value into a document; failures are argument errors.
fn to_document<T: serde::Serialize + ?Sized>(value: &T) -> crate::error::Result<Document> {
    crate::bson::to_document(value)
        .map_err(|e| Error::invalid_argument(format!("cannot serialize document: {e}")))
}
