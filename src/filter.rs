use crate::models::StudentRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search_query: String,
    pub show_updated_only: bool,
}

impl FilterState {
    pub fn is_active(&self) -> bool {
        self.show_updated_only || !self.search_query.trim().is_empty()
    }
}

/// Derives the visible sequence: updated-only first, then search over
/// what remains. Canonical order is preserved.
pub fn apply<'a>(records: &'a [StudentRecord], filter: &FilterState) -> Vec<&'a StudentRecord> {
    let toggled = records
        .iter()
        .filter(|record| !filter.show_updated_only || record.updated_since_view);
    search(toggled, &filter.search_query)
}

pub fn search<'a, I>(records: I, query: &str) -> Vec<&'a StudentRecord>
where
    I: IntoIterator<Item = &'a StudentRecord>,
{
    let query = query.trim().to_lowercase();
    records
        .into_iter()
        .filter(|record| query.is_empty() || matches_query(&record.name, &record.repo, &query))
        .collect()
}

/// `query` must already be trimmed and lowercased.
pub fn matches_query(name: &str, repo: &str, query: &str) -> bool {
    name.to_lowercase().contains(query)
        || repo.to_lowercase().contains(query)
        || phonetic_initials(name).contains(query)
}

/// Concatenated pinyin initials of the characters the lookup table
/// knows; other characters contribute nothing. "张伟" -> "zw".
pub fn phonetic_initials(name: &str) -> String {
    name.chars().filter_map(initial).collect()
}

fn initial(c: char) -> Option<char> {
    let letter = match c {
        '安' | '艾' | '爱' => 'a',
        '白' | '包' | '鲍' | '毕' | '边' | '卞' | '柏' | '宝' | '彬' | '斌' | '冰' | '博' | '北' => 'b',
        '陈' | '程' | '曹' | '蔡' | '崔' | '常' | '车' | '成' | '超' | '晨' | '春' | '翠' | '聪' | '川' | '楚' | '琛' => 'c',
        '邓' | '丁' | '杜' | '董' | '戴' | '段' | '狄' | '刁' | '东' | '丹' | '德' | '栋' | '达' | '迪' | '冬' | '蝶' => 'd',
        '鄂' | '恩' | '尔' => 'e',
        '冯' | '范' | '方' | '傅' | '付' | '费' | '樊' | '房' | '凤' | '芳' | '飞' | '菲' | '峰' | '锋' | '帆' | '福' | '富' => 'f',
        '郭' | '高' | '顾' | '龚' | '葛' | '耿' | '关' | '管' | '甘' | '谷' | '广' | '刚' | '国' | '光' | '桂' | '歌' => 'g',
        '黄' | '胡' | '何' | '韩' | '侯' | '贺' | '郝' | '洪' | '华' | '霍' | '花' | '海' | '浩' | '红' | '辉' | '慧' | '惠' | '涵' | '航' | '昊' | '豪' | '鸿' | '虹' | '晖' | '宏' => 'h',
        '江' | '蒋' | '金' | '贾' | '姜' | '焦' | '纪' | '季' | '简' | '靳' | '景' | '杰' | '俊' | '军' | '娟' | '静' | '佳' | '嘉' | '建' | '健' | '洁' | '晶' | '菁' | '婧' | '锦' | '君' | '骏' => 'j',
        '孔' | '康' | '柯' | '匡' | '凯' | '可' | '坤' | '宽' | '奎' => 'k',
        '李' | '刘' | '林' | '梁' | '罗' | '吕' | '卢' | '陆' | '雷' | '黎' | '龙' | '廖' | '赖' | '蓝' | '郎' | '冷' | '鲁' | '栾' | '丽' | '磊' | '玲' | '琳' | '亮' | '乐' | '莉' | '兰' | '岚' | '立' | '力' | '露' | '璐' | '霖' | '伦' | '凌' => 'l',
        '马' | '毛' | '孟' | '莫' | '梅' | '苗' | '穆' | '麦' | '明' | '敏' | '美' | '萌' | '淼' | '曼' | '茂' | '民' | '铭' | '鸣' => 'm',
        '倪' | '聂' | '牛' | '宁' | '农' | '娜' | '妮' | '楠' | '南' => 'n',
        '欧' | '区' => 'o',
        '潘' | '彭' | '裴' | '庞' | '蒲' | '皮' | '平' | '鹏' | '萍' | '朋' | '沛' | '培' => 'p',
        '钱' | '秦' | '邱' | '丘' | '齐' | '祁' | '戚' | '覃' | '曲' | '瞿' | '强' | '琪' | '琦' | '晴' | '倩' | '清' | '庆' | '秋' | '青' | '泉' | '群' | '乾' => 'q',
        '任' | '阮' | '饶' | '荣' | '容' | '冉' | '瑞' | '蕊' | '然' | '日' | '若' | '锐' | '润' | '仁' => 'r',
        '孙' | '宋' | '苏' | '沈' | '石' | '史' | '邵' | '施' | '盛' | '舒' | '司' | '单' | '尚' | '帅' | '顺' | '思' | '松' | '淑' | '爽' | '霜' | '森' | '胜' | '生' | '珊' | '双' | '硕' | '莎' => 's',
        '唐' | '田' | '陶' | '谭' | '汤' | '滕' | '童' | '涂' | '佟' | '天' | '婷' | '涛' | '腾' | '彤' | '亭' | '桐' | '泰' | '甜' => 't',
        '王' | '吴' | '魏' | '汪' | '万' | '武' | '韦' | '温' | '文' | '翁' | '伍' | '伟' | '威' | '薇' | '巍' | '雯' | '微' | '维' | '玮' | '旺' | '婉' | '望' => 'w',
        '徐' | '许' | '谢' | '萧' | '肖' | '夏' | '熊' | '薛' | '向' | '邢' | '项' | '辛' | '小' | '晓' | '欣' | '鑫' | '新' | '雪' | '霞' | '翔' | '祥' | '旭' | '轩' | '萱' | '璇' | '馨' | '星' | '兴' | '秀' | '贤' | '湘' | '曦' | '希' | '昕' => 'x',
        '杨' | '叶' | '余' | '于' | '袁' | '姚' | '严' | '尹' | '易' | '殷' | '游' | '俞' | '阎' | '颜' | '岳' | '应' | '郁' | '一' | '宇' | '雨' | '阳' | '洋' | '勇' | '艳' | '燕' | '颖' | '莹' | '英' | '瑶' | '怡' | '逸' | '亿' | '毅' | '云' | '芸' | '月' | '悦' | '源' | '媛' | '远' | '玉' | '雅' | '亚' | '妍' | '岩' | '言' | '宜' | '渊' | '扬' => 'y',
        '张' | '赵' | '周' | '朱' | '郑' | '钟' | '曾' | '邹' | '庄' | '卓' | '翟' | '詹' | '章' | '祝' | '左' | '宗' | '志' | '智' | '子' | '紫' | '梓' | '之' | '芝' | '珍' | '震' | '正' | '政' | '哲' | '喆' | '振' | '真' | '中' | '忠' | '洲' | '舟' | '竹' | '泽' | '铮' | '峥' => 'z',
        _ => return None,
    };
    Some(letter)
}
