/// The width of anything measured in 16-bit slots
///
/// `long` and `double` occupy two slots everywhere the class file format counts slots (constant
/// pool entries, local variables, operand stack depth); everything else occupies one.
pub trait Width {
    fn width(&self) -> usize;
}
