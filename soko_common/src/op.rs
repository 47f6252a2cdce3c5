/// Implements the standard arithmetic traits for single-field tuple newtypes.
///
/// Three forms are supported:
/// * `op!(binary Foo, Add, add)` for `Foo + Foo -> Foo` style traits,
/// * `op!(inplace Foo, AddAssign, add_assign)` for `Foo += Foo` style traits,
/// * `op!(unary Foo, Neg, neg)` for `-Foo` style traits.
#[macro_export]
macro_rules! op {
    (binary $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0)
            }
        }
    };
    (unary $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
