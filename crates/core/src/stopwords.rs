//! Bilingual stopword set, built once per process and never mutated.

use std::collections::HashSet;

const ENGLISH: &str = "
i me my myself we our ours ourselves you your yours yourself yourselves he him
his himself she her hers herself it its itself they them their theirs themselves
what which who whom this that these those am is are was were be been being have
has had having do does did doing a an the and but if or because as until while of
at by for with about against between into through during before after above below
to from up down in out on off over under again further then once here there when
where why how all any both each few more most other some such no nor not only own
same so than too very s t can will just don should now d ll m o re ve y ain aren
couldn didn doesn hadn hasn haven isn ma mightn mustn needn shan shouldn wasn weren
won wouldn
onto within without per via also may might must shall would could ever never
always often sometimes usually rather quite somewhat indeed either neither another
much many way people person data fig
1 2 3 4 5 6 7 8 9 0
";

const CHINESE: &str = "
的 了 是 在 和 有 及 与 为 于 对 被 就 这 那 一个 一种 我 你 他 她 它 我们 他们 这些 那些
等 或 所以 因为 并 且 即 又 将 及其 以及 可 能 由 计算 可以 一切 开始 结束 输出 输入
";

#[derive(Debug, Clone)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl StopwordSet {
    /// English and Chinese function words.
    pub fn bilingual() -> Self {
        let words = ENGLISH
            .split_whitespace()
            .chain(CHINESE.split_whitespace())
            .map(str::to_string)
            .collect();
        Self { words }
    }

    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for word in extra {
            let word = word.as_ref().trim().to_lowercase();
            if !word.is_empty() {
                self.words.insert(word);
            }
        }
        self
    }

    pub fn contains(&self, token: &str) -> bool {
        self.words.contains(token)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }
}
